//! A thin demonstration CLI (spec.md §5-9): run a script file or an
//! `-e` string and print `output`/`last_return`. Grounded on the
//! teacher's `src/bin/main.rs`, stripped of its REPL, `require -l`, and
//! `arg` table setup — this crate's scope is the VM and its library
//! surface, not a full interpreter front end.

use std::env;
use std::fs;
use std::io::{self, Read};

use luavm::LuaVM;

const VERSION: &str = "luavm 0.1 (Lua 5.4 subset)";

fn print_usage() {
    eprintln!("usage: lua [-e stat] [script]");
    eprintln!("  -e stat   execute string 'stat'");
    eprintln!("  -v        show version information");
    eprintln!("  -         execute stdin");
}

fn run_and_report(vm: &mut LuaVM, source: &str, source_name: &str) -> bool {
    if let Err(e) = vm.compile(source, source_name) {
        eprintln!("lua: {}", e);
        return false;
    }
    match vm.execute() {
        Ok(()) => {
            for line in &vm.output {
                println!("{}", line);
            }
            true
        }
        Err(e) => {
            eprintln!("lua: {}", e.value.display_string());
            if let Some(tb) = &e.traceback {
                eprintln!("{}", tb);
            }
            false
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut vm = LuaVM::new();
    vm.open_libs();

    let mut i = 0;
    let mut ran_anything = false;
    let mut ok = true;
    while i < args.len() {
        match args[i].as_str() {
            "-v" => {
                println!("{}", VERSION);
                ran_anything = true;
            }
            "-e" => {
                i += 1;
                let Some(code) = args.get(i) else {
                    eprintln!("lua: '-e' needs argument");
                    print_usage();
                    std::process::exit(1);
                };
                ok &= run_and_report(&mut vm, code, "=(command line)");
                ran_anything = true;
            }
            "-" => {
                let mut code = String::new();
                if io::stdin().read_to_string(&mut code).is_ok() {
                    ok &= run_and_report(&mut vm, &code, "=stdin");
                }
                ran_anything = true;
            }
            "-h" | "--help" => {
                print_usage();
                return;
            }
            path => match fs::read_to_string(path) {
                Ok(code) => {
                    ok &= run_and_report(&mut vm, &code, path);
                    ran_anything = true;
                }
                Err(e) => {
                    eprintln!("lua: cannot open {}: {}", path, e);
                    std::process::exit(1);
                }
            },
        }
        i += 1;
    }

    if !ran_anything {
        print_usage();
    }
    if !ok {
        std::process::exit(1);
    }
}
