use std::io::{BufRead, BufReader, Read, Write};
use crate::evaluator::Evaluator;
use std::string::String;
use crate::ast::Node;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::repl::MONKEY_FACE;

const PROMPT: &str = ">> ";

// The tree-walking variant of the repl, served by its own binary.
pub fn start<R: Read, W: Write>(reader: R, mut writer: W) -> std::io::Result<()> {
    let mut env = Evaluator::new();
    let mut reader = BufReader::new(reader);
    loop {
        write!(writer, "{}", PROMPT)?;
        writer.flush()?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        if line.trim() == "exit" {
            return Ok(());
        }

        let l = Lexer::new(&line);
        let mut p = Parser::new(l);
        let program = p.parse_program();
        if p.errors().len() > 0 {
            print_parser_error(&mut writer, p.errors())?;
            continue;
        }

        let evaluated = env.eval(Node::Program(program));
        let out = match evaluated {
            None => "returned object is None".to_string(),
            Some(obj) => format!("{}\n", obj),
        };
        writer.write_all(out.as_ref())?;
    }

}

fn print_parser_error<W: Write>(mut writer: W, errs: Vec<String>) -> std::io::Result<()>{
    write!(writer, "{}", MONKEY_FACE)?;
    write!(writer, "Woops! We ran into some monkey business here!\n parser errors:\n")?;
    for msg in errs {
        write!(writer, "    {}\n", msg)?;
    }
    writer.flush()
}
