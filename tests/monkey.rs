use std::cell::RefCell;
use std::rc::Rc;

use monkey::ast::{Node, Program};
use monkey::builtin::BUILTINS;
use monkey::compiler::Compiler;
use monkey::evaluator::Evaluator;
use monkey::lexer::Lexer;
use monkey::object::Object;
use monkey::parser::Parser;
use monkey::symbol_table::SymbolTable;
use monkey::vm::{self, VM};

fn parse(input: &str) -> Program {
    let l = Lexer::new(input);
    let mut p = Parser::new(l);
    let program = p.parse_program();
    assert!(p.errors().is_empty(), "parser errors for {:?}: {:?}", input, p.errors());
    program
}

fn run_vm(input: &str) -> Result<Object, String> {
    let program = parse(input);

    let mut comp = Compiler::new();
    comp.compile(Node::Program(program)).map_err(|e| e.to_string())?;

    let mut machine = VM::new(comp.byte_code());
    machine.run().map_err(|e| e.to_string())?;
    Ok(machine.last_popped_stack_elem())
}

fn run_eval(input: &str) -> Object {
    let program = parse(input);
    let mut evaluator = Evaluator::new();
    evaluator.eval(Node::Program(program)).expect("evaluator returned nothing")
}

#[test]
fn end_to_end_scenarios() {
    let tests = vec![
        ("1 + 2 * 3", Object::Integer(7)),
        (r#""foo" + "bar""#, Object::String("foobar".to_string())),
        ("let x = 5; let y = x + 10; y", Object::Integer(15)),
        ("let a = [1,2,3]; a[1]", Object::Integer(2)),
        (r#"let h = {"a": 1, "b": 2}; h["b"]"#, Object::Integer(2)),
        ("let add = fn(a,b){a+b}; add(2,3)", Object::Integer(5)),
        ("if (false) { 10 } else { 20 }", Object::Integer(20)),
        ("[1,2,3][99]", Object::NULL),
        (r#"len("hello")"#, Object::Integer(5)),
    ];

    for (input, expected) in tests {
        let got = run_vm(input).unwrap_or_else(|e| panic!("vm failed for {:?}: {}", input, e));
        assert_eq!(got, expected, "wrong result for {:?}", input);
    }
}

#[test]
fn end_to_end_runtime_error() {
    let err = run_vm("1 + true").expect_err("expected a runtime error");
    assert_eq!(err, "unsupported types for binary operation: INTEGER BOOLEAN");
}

// The tree-walking evaluator doubles as an oracle: for programs both
// back-ends support, their results must agree.
#[test]
fn vm_and_evaluator_agree() {
    let programs = vec![
        "1 + 2 * 3 - 4 / 2",
        "-(5 + 5)",
        "(5 + 10 * 2 + 15 / 3) * 2 + -10",
        "1 < 2",
        "1 <= 1",
        "2 >= 3",
        "true == false",
        "!!false",
        "!(if (false) { 5; })",
        "if (1 < 2) { 10 } else { 20 }",
        "if (false) { 10 }",
        r#""mon" + "key" + " " + "business""#,
        "[1, 2 * 2, 3 + 3]",
        "[1, 2, 3][0 + 2]",
        "[[1, 1, 1]][0][0]",
        "[1, 2, 3][99]",
        r#"{"one": 1, "two": 2}["two"]"#,
        "{1: 1, 2: 2}[2]",
        "{true: 10}[true]",
        "{}[0]",
        "let x = 5; let y = x + 10; y",
        "let a = 1; a = a + 2; a",
        "let a = 1; let bump = fn() { a = a + 1 }; bump(); bump(); a",
        "let identity = fn(a) { a; }; identity(4)",
        "let add = fn(a, b) { a + b }; add(add(1, 2), 3)",
        "let early = fn() { return 9; 10 }; early()",
        "let nothing = fn() { }; nothing()",
        r#"len("hello world")"#,
        "len([1, 2, 3])",
        "first([7, 8, 9])",
        "last([7, 8, 9])",
        "rest([7, 8, 9])",
        "init([7, 8, 9])",
        "push([1], 2)",
        "let a = [1, 2, 3]; set(a, 0, 99); a[0]",
        r#"int("42") + 1"#,
        "first([])",
        "use(lib) { let a = 40 } a + 2",
        "use(lib) { 1 }",
    ];

    for input in programs {
        let vm_result = run_vm(input).unwrap_or_else(|e| panic!("vm failed for {:?}: {}", input, e));
        let eval_result = run_eval(input);
        assert_eq!(
            format!("{}", vm_result),
            format!("{}", eval_result),
            "back-ends disagree on {:?}", input
        );
    }
}

#[test]
fn file_builtins_read_a_real_file() {
    let path = std::env::temp_dir().join("monkey_integration_lines.txt");
    std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();

    let program = format!(
        r#"let f = open("{}"); let all = lines(f); close(f); all"#,
        path.display()
    );
    let result = run_vm(&program).unwrap();
    assert_eq!(result, Object::array(vec![
        Object::String("alpha".to_string()),
        Object::String("beta".to_string()),
        Object::String("gamma".to_string()),
    ]));

    let program = format!(r#"let f = open("{}"); read(f)"#, path.display());
    let result = run_vm(&program).unwrap();
    assert_eq!(result, Object::String("alpha\n".to_string()));
}

// The repl wiring: symbol table, constants and globals survive from one
// compile/run cycle into the next.
#[test]
fn compiled_state_threads_across_runs() {
    let symbol_table = Rc::new(RefCell::new(SymbolTable::new()));
    for (i, (name, _)) in BUILTINS.iter().enumerate() {
        symbol_table.borrow_mut().define_builtin(i, name);
    }
    let mut constants: Vec<Object> = Vec::new();
    let mut globals: Vec<Object> = vec![Object::Null; vm::GLOBAL_SIZE];

    let lines = vec![
        ("let a = 10;", Object::Integer(10)),
        ("let b = a * 2;", Object::Integer(20)),
        ("a + b", Object::Integer(30)),
        ("len([a, b])", Object::Integer(2)),
    ];

    for (line, expected) in lines {
        let program = parse(line);

        let mut comp = Compiler::new_with_state(Rc::clone(&symbol_table), constants.clone());
        comp.compile(Node::Program(program)).unwrap();

        let byte_code = comp.byte_code();
        constants = byte_code.constants.clone();

        let mut machine = VM::new_with_globals_store(byte_code, globals);
        machine.run().unwrap();
        assert_eq!(machine.last_popped_stack_elem(), expected, "wrong result for {:?}", line);

        globals = machine.into_globals();
    }
}
