use std::ffi::OsString;
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use structopt::StructOpt;

use super::reset::hard_reset;
use super::{parse_args, OpenOptions, PortFactory, Tool};
use crate::serial::SerialSettings;
use crate::transport::SerialPort;
use crate::Result;

/// A receive-only serial terminal.
#[derive(Debug)]
pub struct Miniterm;

#[derive(StructOpt, Debug)]
#[structopt(name = "miniterm", about = "Print everything received on a serial port")]
struct Opts {
    /// Serial port name. Connections are redirected to the FTDI device regardless.
    #[structopt(default_value = "ftdi:///1")]
    port: String,

    /// Baud rate.
    #[structopt(default_value = "115200")]
    baudrate: u32,

    /// Initial DTR line state (0 or 1).
    #[structopt(long, parse(try_from_str = parse_level))]
    dtr: Option<bool>,

    /// Initial RTS line state (0 or 1).
    #[structopt(long, parse(try_from_str = parse_level))]
    rts: Option<bool>,

    /// Pulse the reset line once the port is open.
    #[structopt(long)]
    reset: bool,

    /// Send this text once the port is open.
    #[structopt(long)]
    send: Option<String>,

    /// Stop after this many milliseconds instead of running until an error occurs.
    #[structopt(long = "duration-ms")]
    duration_ms: Option<u64>,
}

fn parse_level(s: &str) -> std::result::Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(format!("expected 0 or 1, got `{}`", s)),
    }
}

impl Tool for Miniterm {
    fn name(&self) -> &'static str {
        "miniterm"
    }

    fn run(&self, args: Vec<OsString>, ports: &dyn PortFactory) -> Result<()> {
        let opts: Opts = match parse_args(args)? {
            Some(opts) => opts,
            None => return Ok(()),
        };

        let options = OpenOptions {
            settings: SerialSettings {
                baud_rate: opts.baudrate,
                ..SerialSettings::default()
            },
            do_not_open: true,
        };
        let mut port = ports.serial_for_url(&opts.port, &options)?;

        if let Some(dtr) = opts.dtr {
            log::info!("DTR {}", if dtr { "active" } else { "inactive" });
            port.set_dtr(dtr)?;
        }
        if let Some(rts) = opts.rts {
            log::info!("RTS {}", if rts { "active" } else { "inactive" });
            port.set_rts(rts)?;
        }
        port.open()?;

        eprintln!("--- Miniterm on {}  {},8,N,1 ---", opts.port, opts.baudrate);

        if opts.reset {
            hard_reset(&mut *port)?;
        }

        if let Some(text) = &opts.send {
            port.write(text.as_bytes())?;
        }

        let deadline = opts
            .duration_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let result = pump(&mut *port, deadline);
        port.close();
        result
    }
}

/// Copies received bytes to stdout until `deadline`, or forever.
fn pump(port: &mut dyn SerialPort, deadline: Option<Instant>) -> Result<()> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    loop {
        let data = port.read(0)?;
        if data.is_empty() {
            if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
            continue;
        }
        stdout.write_all(&data)?;
        stdout.flush()?;
    }
}
