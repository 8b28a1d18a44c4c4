use std::{env, process};

use ftdi_strobe::{bootstrap, ErrorKind};

fn main() {
    env_logger::init();

    if let Err(e) = bootstrap::main(env::args_os()) {
        match e.kind() {
            ErrorKind::Usage => eprintln!("{}", e),
            _ => eprintln!("error: {}", e),
        }
        process::exit(1);
    }
}
