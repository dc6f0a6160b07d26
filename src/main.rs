use std::env;
use std::fs;
use std::io;
use std::io::Read;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use log::debug;
use simple_logger::SimpleLogger;

use monkey::ast::Node;
use monkey::compiler::Compiler;
use monkey::lexer::Lexer;
use monkey::parser;
use monkey::repl;
use monkey::vm::VM;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The Monkey interpreter.
#[derive(Parser)]
#[command(name = "monkey")]
struct Cli {
    /// Print the version and exit
    #[arg(long)]
    version: bool,

    /// Start the interactive repl
    #[arg(long)]
    repl: bool,

    /// Script to run; stdin is read to EOF when omitted
    script: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    SimpleLogger::new().env().init()?;

    // the flags answer to both spellings: -version/-repl and
    // --version/--repl
    let args = env::args().map(|arg| match arg.as_str() {
        "-version" => "--version".to_string(),
        "-repl" => "--repl".to_string(),
        _ => arg,
    });
    let cli = Cli::parse_from(args);

    if cli.version {
        println!("Monkey v{}", VERSION);
        return Ok(());
    }

    if cli.repl {
        println!("Monkey v{}", VERSION);
        repl::start(io::stdin(), io::stdout())?;
        return Ok(());
    }

    let source = match &cli.script {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
            buffer
        }
    };

    process::exit(execute(&source));
}

fn execute(source: &str) -> i32 {
    let l = Lexer::new(source);
    let mut p = parser::Parser::new(l);

    let program = p.parse_program();
    if !p.errors().is_empty() {
        for msg in p.errors() {
            println!("\t{}", msg);
        }
        return 1;
    }

    let mut comp = Compiler::new();
    if let Err(err) = comp.compile(Node::Program(program)) {
        println!("Compile error:\n{}", err);
        return 1;
    }

    let byte_code = comp.byte_code();
    match byte_code.instructions.to_string() {
        Ok(listing) => debug!("compiled bytecode:\n{}", listing),
        Err(err) => debug!("bytecode not disassemblable: {}", err),
    }

    let mut machine = VM::new(byte_code);
    if let Err(err) = machine.run() {
        println!("Executing bytecode failed:\n{}", err);
        return 1;
    }

    0
}
