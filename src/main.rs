//! Sift CLI: lex, parse, compile or run filter scripts.

use std::env;
use std::fs;
use std::process;

use siftlang::runtime::Environment;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Dump the token stream of a script
    Lex { file: String },
    /// Dump the parsed AST of a script
    Parse { file: String },
    /// Dump constants and disassembled bytecode
    Bytecode { file: String, optimize: bool },
    /// Compile and execute a script
    Run {
        file: String,
        json: Option<String>,
        optimize: bool,
    },
}

fn print_usage() {
    eprintln!("Sift {} - an embeddable event-filtering language", VERSION);
    eprintln!();
    eprintln!("Usage: sift lex <script>");
    eprintln!("       sift parse <script>");
    eprintln!("       sift bytecode [-no-optimize] <script>");
    eprintln!("       sift run [-json <path>] [-no-optimize] <script>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  lex       Show the token stream the lexer produces");
    eprintln!("  parse     Show the parsed AST");
    eprintln!("  bytecode  Show the constant pool and disassembled bytecode");
    eprintln!("  run       Execute the script and print its result");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -json <path>   Evaluate against the JSON object in <path>");
    eprintln!("  -no-optimize   Skip the peephole optimizer");
    eprintln!("  --help, -h     Show this help message");
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        print_usage();
        process::exit(if args.is_empty() { 1 } else { 0 });
    }

    let command = args[0].as_str();
    let rest = &args[1..];

    let mut json = None;
    let mut optimize = true;
    let mut file = None;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "-json" => {
                if i + 1 >= rest.len() {
                    eprintln!("-json requires a path");
                    process::exit(1);
                }
                json = Some(rest[i + 1].clone());
                i += 2;
            }
            "-no-optimize" => {
                optimize = false;
                i += 1;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                process::exit(1);
            }
            arg => {
                if file.is_some() {
                    eprintln!("Only one script may be given");
                    process::exit(1);
                }
                file = Some(arg.to_string());
                i += 1;
            }
        }
    }

    let Some(file) = file else {
        eprintln!("No script given");
        print_usage();
        process::exit(1);
    };

    match command {
        "lex" => Command::Lex { file },
        "parse" => Command::Parse { file },
        "bytecode" => Command::Bytecode { file, optimize },
        "run" => Command::Run {
            file,
            json,
            optimize,
        },
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(1);
        }
    }
}

fn read_source(file: &str) -> String {
    match fs::read_to_string(file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Failed to read {}: {}", file, err);
            process::exit(1);
        }
    }
}

fn cmd_lex(file: &str) {
    let source = read_source(file);
    for token in siftlang::tokenize(&source) {
        println!("{:4} {}", token.span.line, token.kind);
    }
}

fn cmd_parse(file: &str) {
    let source = read_source(file);
    match siftlang::parse(&source) {
        Ok(ast) => println!("{}", ast),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn cmd_bytecode(file: &str, optimize: bool) {
    let source = read_source(file);
    match siftlang::compile_with_options(&source, optimize) {
        Ok(program) => {
            println!("Constants:");
            for (i, constant) in program.constants.iter().enumerate() {
                println!("{:4} {}", i, constant.inspect());
            }
            println!("Bytecode:");
            print!("{}", program.disassemble());
        }
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn cmd_run(file: &str, json: Option<&str>, optimize: bool) {
    let source = read_source(file);

    let record: Option<serde_json::Value> = json.map(|path| {
        let text = read_source(path);
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                eprintln!("Failed to parse {}: {}", path, err);
                process::exit(1);
            }
        }
    });

    let program = match siftlang::compile_with_options(&source, optimize) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let mut env = Environment::new();
    let record_ref = record.as_ref().map(|r| r as &dyn siftlang::Record);

    match siftlang::run(&program, &mut env, record_ref) {
        Ok(result) => println!("{}", result.inspect()),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn main() {
    match parse_args() {
        Command::Lex { file } => cmd_lex(&file),
        Command::Parse { file } => cmd_parse(&file),
        Command::Bytecode { file, optimize } => cmd_bytecode(&file, optimize),
        Command::Run {
            file,
            json,
            optimize,
        } => cmd_run(&file, json.as_deref(), optimize),
    }
}
