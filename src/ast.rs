use std::string::String;
use std::fmt;
use std::fmt::Formatter;

pub enum Node {
    Program(Program),
    Statement(Statement),
    Expression(Expression),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in self.statements.iter() {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Statement {
    LetStatement{name: String, value: Expression},
    ReturnStatement(Expression),
    ExpressionStatement(Expression),
    BlockStatement(Vec<Statement>)
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Statement::LetStatement { name, value } => {
                write!(f, "let {} = {}", name, value)?
            },
            Statement::ReturnStatement(ret) => {
                write!(f, "return {}", ret)?
            },
            Statement::ExpressionStatement(exp) => {
                write!(f, "{}", exp)?
            },
            Statement::BlockStatement(block) => {
                for stmt in block.iter() {
                    write!(f, "{}", stmt)?
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expression {
    Identifier(String),
    Boolean(bool),
    Integer(i64),
    String(String),
    Array(Vec<Expression>),
    // pairs keep their source order; map semantics happen at compile/eval time
    Hash(Vec<(Expression, Expression)>),
    PrefixExpression{
        operator: String,
        right: Box<Expression>
    },
    InfixExpression {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    IfExpression{
        condition: Box<Expression>,
        consequence: Box<Statement>,
        alternative: Option<Box<Statement>>,
    },
    Function{
        name: String,
        parameters: Vec<String>,
        body: Box<Statement>,
    },
    CallExpression{
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    IndexExpression{
        left: Box<Expression>,
        index: Box<Expression>,
    },
    AssignExpression{
        name: String,
        value: Box<Expression>,
    },
    UseExpression{
        value: Box<Expression>,
        body: Program,
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(ident) => {write!(f, "{}", ident)},
            Expression::Boolean(b) => {write!(f, "{}", b)},
            Expression::Integer(int) => {write!(f, "{}", int)},
            Expression::String(st) => {write!(f, "{}", st)},
            Expression::Array(exps) => {
                write!(f, "[{}]", exps.iter().
                    map(|exp| format!("{}", exp)).
                    collect::<Vec<_>>().join(", "))
            },
            Expression::Hash(pairs) => {
                write!(f, "{{{}}}", pairs.iter().
                    map(|kv| format!("{}: {}", kv.0, kv.1)).
                    collect::<Vec<_>>().join(", "))
            },
            Expression::PrefixExpression { operator, right } => {
                write!(f, "({}{})", operator, right)
            },
            Expression::InfixExpression { operator, left, right } => {
                write!(f, "({} {} {})", left, operator, right)
            }
            Expression::IfExpression { condition, consequence, alternative } => {
                write!(f, "if {} {{{}}}{}", condition, consequence,
                       match alternative {
                           None => {
                               "".to_string()
                           },
                           Some(alt) => {
                               format!(" else {{{}}}", alt)
                           }
                       })
            },
            Expression::Function { name, parameters, body } => {
                write!(f, "fn{} ({}) {{{}}}",
                    if name.is_empty() { "".to_string() } else { format!("<{}>", name) },
                    parameters.join(", "),
                    body
                )
            },
            Expression::CallExpression { function, arguments } => {
                write!(f, "{}({})", function,
                    arguments.iter().map(|arg| format!("{}", arg)).
                        collect::<Vec::<_>>().join(", ")
                )
            }
            Expression::IndexExpression { left, index} => {
                write!(f, "({}[{}])", left, index)
            }
            Expression::AssignExpression { name, value } => {
                write!(f, "{} = {}", name, value)
            }
            Expression::UseExpression { value, .. } => {
                write!(f, "use({})", value)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{Expression, Program, Statement};

    #[test]
    fn test_ast() {
        let program = Program {
            statements: vec![
                Statement::LetStatement {
                    name: "a".to_string(),
                    value: Expression::Integer(12),
                }
            ],
        };

        let out = format!("{}", program);
        assert_eq!(out, "let a = 12")
    }

    #[test]
    fn test_named_function_literal() {
        let f = Expression::Function {
            name: "double".to_string(),
            parameters: vec!["x".to_string()],
            body: Box::new(Statement::BlockStatement(vec![
                Statement::ExpressionStatement(Expression::InfixExpression {
                    operator: "*".to_string(),
                    left: Box::new(Expression::Identifier("x".to_string())),
                    right: Box::new(Expression::Integer(2)),
                })
            ])),
        };

        assert_eq!(format!("{}", f), "fn<double> (x) {(x * 2)}");
    }

    #[test]
    fn test_hash_literal_keeps_source_order() {
        let h = Expression::Hash(vec![
            (Expression::String("z".to_string()), Expression::Integer(1)),
            (Expression::String("a".to_string()), Expression::Integer(2)),
        ]);

        assert_eq!(format!("{}", h), "{z: 1, a: 2}");
    }
}
