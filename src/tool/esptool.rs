use std::ffi::OsString;
use std::io::{self, Write};
use std::time::Duration;

use structopt::StructOpt;

use super::reset::{self, After, Before};
use super::{capture, parse_args, OpenOptions, PortFactory, Tool};
use crate::serial::SerialSettings;
use crate::transport::SerialPort;
use crate::Result;

/// Line the ROM prints once it waits for a download.
const DOWNLOAD_BANNER: &str = "waiting for download";

/// Strobes the reset and boot-mode lines of ESP chips.
#[derive(Debug)]
pub struct Esptool;

#[derive(StructOpt, Debug)]
#[structopt(name = "esptool", about = "Reset ESP chips into the bootloader or the application")]
struct Opts {
    /// Serial port device. Connections are redirected to the FTDI device regardless.
    #[structopt(short, long, default_value = "ftdi:///1")]
    port: String,

    /// Serial port baud rate.
    #[structopt(short, long, default_value = "115200")]
    baud: u32,

    /// What to do before connecting to the chip.
    #[structopt(long, default_value = "default_reset", possible_values = Before::VARIANTS)]
    before: Before,

    /// What to do after the command is done. `enter_bootloader` leaves the chip in download mode
    /// regardless.
    #[structopt(long, default_value = "hard_reset", possible_values = After::VARIANTS)]
    after: After,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
#[structopt(rename_all = "snake_case")]
enum Command {
    /// Reset into the ROM download mode and print what the ROM reports.
    EnterBootloader {
        /// How long to collect ROM output, in milliseconds.
        #[structopt(long = "capture-ms", default_value = "200")]
        capture_ms: u64,
    },
    /// Run the application code in flash.
    Run,
    /// Reset into the application and print its boot log.
    ReadBootLog {
        /// How long to collect output, in milliseconds.
        #[structopt(long = "duration-ms", default_value = "1000")]
        duration_ms: u64,
    },
}

impl Tool for Esptool {
    fn name(&self) -> &'static str {
        "esptool"
    }

    fn run(&self, args: Vec<OsString>, ports: &dyn PortFactory) -> Result<()> {
        let opts: Opts = match parse_args(args)? {
            Some(opts) => opts,
            None => return Ok(()),
        };

        let settings = SerialSettings {
            baud_rate: opts.baud,
            ..SerialSettings::default()
        };
        let mut port = ports.serial_for_url(&opts.port, &OpenOptions::new(settings))?;

        match opts.cmd {
            Command::EnterBootloader { capture_ms } => {
                let capture_for = Duration::from_millis(capture_ms);
                enter_bootloader(&mut *port, opts.before, capture_for)?;
                if opts.after != After::NoReset {
                    log::debug!("staying in download mode, ignoring --after");
                }
            }
            Command::Run => {
                println!("Hard resetting via RTS pin...");
                reset::hard_reset(&mut *port)?;
            }
            Command::ReadBootLog { duration_ms } => {
                reset::hard_reset(&mut *port)?;
                let log = capture(&mut *port, Duration::from_millis(duration_ms))?;
                let stdout = io::stdout();
                let mut stdout = stdout.lock();
                stdout.write_all(&log)?;
                stdout.flush()?;
            }
        }

        port.close();
        Ok(())
    }
}

/// Resets into download mode and prints the ROM output. Returns whether the ROM reported that it
/// waits for a download.
fn enter_bootloader(
    port: &mut dyn SerialPort,
    before: Before,
    capture_for: Duration,
) -> Result<bool> {
    port.reset_input_buffer()?;
    before.apply(port)?;

    let banner = capture(port, capture_for)?;
    let banner = String::from_utf8_lossy(&banner);
    print!("{}", banner);
    let waiting = banner.contains(DOWNLOAD_BANNER);
    if waiting {
        println!("Chip is in download mode.");
    } else if before == Before::DefaultReset {
        log::warn!("no `{}` banner seen; check the GPIO0 and EN wiring", DOWNLOAD_BANNER);
    }
    Ok(waiting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockDevice, MockFactory};
    use crate::pins::PinMap;
    use crate::GpioMappedSerial;

    const ROM_BANNER: &[u8] =
        b"rst:0x1 (POWERON_RESET),boot:0x3 (DOWNLOAD_BOOT)\r\nwaiting for download\r\n";
    const APP_BANNER: &[u8] = b"rst:0x1 (POWERON_RESET),boot:0x13 (SPI_FAST_FLASH_BOOT)\r\n";

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    fn opened_with_boot_output(output: &[u8]) -> GpioMappedSerial<MockDevice> {
        let mut device = MockDevice::default();
        device.boot_output = output.to_vec();
        let mut port = GpioMappedSerial::new(device, PinMap::ESP);
        port.open().unwrap();
        port
    }

    #[test]
    fn enter_bootloader_stays_in_download_mode() {
        let factory = MockFactory::with_boot_output(ROM_BANNER);
        Esptool
            .run(
                args(&[
                    "/usr/bin/esptool.py",
                    "--port",
                    "/dev/ttyUSB0",
                    "enter_bootloader",
                    "--capture-ms",
                    "20",
                ]),
                &factory,
            )
            .unwrap();

        let (url, options) = factory.last_request().unwrap();
        assert_eq!(url, "/dev/ttyUSB0");
        assert_eq!(options.settings.baud_rate, 115_200);

        // Initial line state on open, then the classic reset and nothing after it.
        assert_eq!(
            factory.gpio_writes(),
            vec![0b0000_0001, 0b0000_1001, 0b0000_1001, 0b0000_0001, 0b0001_0001, 0b0001_1001]
        );
        assert!(factory.calls().contains(&Call::ResetInput));
        assert!(factory.rx_empty());
        assert_eq!(factory.calls().last(), Some(&Call::Close));
    }

    #[test]
    fn download_banner_is_detected() {
        let mut port = opened_with_boot_output(ROM_BANNER);
        let waiting =
            enter_bootloader(&mut port, Before::DefaultReset, Duration::from_millis(20)).unwrap();
        assert!(waiting);
        assert!(port.get_ref().rx.is_empty());
    }

    #[test]
    fn missing_banner_is_reported() {
        let mut port = opened_with_boot_output(APP_BANNER);
        let waiting =
            enter_bootloader(&mut port, Before::DefaultReset, Duration::from_millis(20)).unwrap();
        assert!(!waiting);
    }

    #[test]
    fn stale_input_is_discarded() {
        let mut port = opened_with_boot_output(b"");
        port.get_mut().rx.extend(b"waiting for download\r\n");
        let waiting =
            enter_bootloader(&mut port, Before::NoReset, Duration::from_millis(20)).unwrap();
        assert!(!waiting);
    }

    #[test]
    fn run_hard_resets_into_application() {
        let factory = MockFactory::default();
        Esptool
            .run(args(&["esptool", "--baud", "460800", "run"]), &factory)
            .unwrap();

        assert_eq!(factory.last_request().unwrap().1.settings.baud_rate, 460_800);
        // open: both asserted; GPIO0 released, then EN pulsed
        assert_eq!(
            factory.gpio_writes(),
            vec![0b0000_0001, 0b0000_1001, 0b0000_1001, 0b0001_1001]
        );
    }

    #[test]
    fn boot_log_is_read_from_the_application() {
        let factory = MockFactory::with_boot_output(APP_BANNER);
        Esptool
            .run(
                args(&["esptool", "read_boot_log", "--duration-ms", "20"]),
                &factory,
            )
            .unwrap();

        assert_eq!(factory.gpio_writes().last(), Some(&0b0001_1001));
        assert!(factory.rx_empty());
    }

    #[test]
    fn rejects_unknown_strategy() {
        let factory = MockFactory::default();
        let err = Esptool
            .run(args(&["esptool", "--before", "usb_reset", "run"]), &factory)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Usage);
        assert!(factory.last_request().is_none());
    }
}
