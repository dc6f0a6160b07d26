use std::cell::RefCell;
use std::io::{BufRead, BufReader, Read, Write};
use std::rc::Rc;
use std::string::String;

use log::debug;

use crate::ast::Node;
use crate::builtin::BUILTINS;
use crate::compiler::Compiler;
use crate::lexer::Lexer;
use crate::object::Object;
use crate::parser::Parser;
use crate::symbol_table::SymbolTable;
use crate::vm;
use crate::vm::VM;

const PROMPT: &str = ">> ";

pub const MONKEY_FACE: &str =
r#"
            __,__
   .--.  .-"     "-.  .--.
  / .. \/  .-. .-.  \/ .. \
 | |  '|  /   Y   \  |'  | |
 | \   \  \ 0 | 0 /  /   / |
  \ '- ,\.-"""""""-./, -' /
   ''-' /_   ^ ^   _\ '-''
       |  \._   _./  |
       \   \ '~' /   /
        '._ '-=-' _.'
           '-----'
"#;

pub fn start<R: Read, W: Write>(reader: R, mut writer: W) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);

    // compiled state survives across prompts: one symbol table, one
    // constant pool, one globals store
    let mut constants: Vec<Object> = Vec::new();
    let mut globals: Vec<Object> = vec![Object::Null; vm::GLOBAL_SIZE];
    let symbol_table = Rc::new(RefCell::new(SymbolTable::new()));
    for (i, (name, _)) in BUILTINS.iter().enumerate() {
        symbol_table.borrow_mut().define_builtin(i, name);
    }

    debug!("starting bytecode repl");

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

        // compile part
        let mut comp = Compiler::new_with_state(Rc::clone(&symbol_table), constants.clone());
        if let Err(msg) = comp.compile(Node::Program(program)) {
            writer.write_all(format!("Compile error:\n{}\n", msg).as_ref())?;
            continue;
        }

        let byte_code = comp.byte_code();
        constants = byte_code.constants.clone();

        let mut machine = VM::new_with_globals_store(byte_code, globals);
        match machine.run() {
            Err(err) => {
                writer.write_all(format!("Executing bytecode failed:\n{}\n", err).as_ref())?;
            },
            Ok(_) => {
                writer.write_all(format!("{}\n", machine.last_popped_stack_elem()).as_ref())?;
            },
        }
        globals = machine.into_globals();
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
