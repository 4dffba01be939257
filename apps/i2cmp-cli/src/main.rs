use anyhow::{Context, Result, bail, ensure};
use clap::{Parser, Subcommand};
use i2cmp_host_core::I2cMpSession;
use i2cmp_host_rusb::{RusbControl, connect_with, list_adapters};
use i2cmp_proto::MAX_ADDRESS;
use std::{fmt::Write as _, time::Duration};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "i2cmp", version)]
#[command(about = "Talk to I2C devices through an I2C-MP-USB adapter", long_about = None)]
struct Args {
    /// USB vendor ID of the adapter
    #[arg(long, value_name = "HEX", default_value = "0x0403", value_parser = parse_number::<u16>)]
    vendor_id: u16,
    /// USB product ID of the adapter
    #[arg(long, value_name = "HEX", default_value = "0xc631", value_parser = parse_number::<u16>)]
    product_id: u16,
    /// Control transfer timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
    /// I2C clock in kHz, applied right after connecting
    #[arg(long, value_name = "KHZ")]
    baudrate: Option<u16>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List attached adapters
    List,
    #[command(flatten)]
    Bus(BusCommand),
}

/// Commands that talk to a connected adapter.
#[derive(Debug, Subcommand)]
enum BusCommand {
    /// Probe a range of addresses, i2cdetect style
    Detect {
        #[arg(long, default_value = "0x03", value_parser = parse_address)]
        first: u8,
        #[arg(long, default_value = "0x77", value_parser = parse_address)]
        last: u8,
    },
    /// Read a byte, a register byte, or a register word (--word)
    Get {
        #[arg(value_parser = parse_address)]
        address: u8,
        #[arg(value_parser = parse_number::<u8>)]
        register: Option<u8>,
        #[arg(long)]
        word: bool,
    },
    /// Write a byte, a register byte, or a register word (--word)
    Set {
        #[arg(value_parser = parse_address)]
        address: u8,
        /// Register, or the byte to send when no value follows
        #[arg(value_parser = parse_number::<u8>)]
        register: u8,
        #[arg(value_parser = parse_number::<u16>)]
        value: Option<u16>,
        #[arg(long)]
        word: bool,
    },
    /// Set the I2C clock
    Baudrate {
        #[arg(value_name = "KHZ")]
        rate_khz: u16,
    },
    /// Reset the adapter into its bootloader
    Bootloader,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let command = match args.command {
        Command::List => return list(args.vendor_id, args.product_id),
        Command::Bus(command) => command,
    };

    let mut session = connect_with(
        args.vendor_id,
        args.product_id,
        Duration::from_millis(args.timeout_ms),
    )
    .context("connect to adapter")?;
    if let Some(rate) = args.baudrate {
        session.set_baudrate(rate).context("set baudrate")?;
    }

    let result = run(&mut session, command);
    session.disconnect();
    result
}

fn list(vendor_id: u16, product_id: u16) -> Result<()> {
    let adapters = list_adapters(vendor_id, product_id).context("list adapters")?;
    if adapters.is_empty() {
        info!("no adapter attached");
    }
    for adapter in adapters {
        println!(
            "Bus {:03} Device {:03}: ID {:04x}:{:04x}",
            adapter.bus, adapter.address, adapter.vendor_id, adapter.product_id
        );
    }
    Ok(())
}

fn run(session: &mut I2cMpSession<RusbControl>, command: BusCommand) -> Result<()> {
    match command {
        BusCommand::Detect { first, last } => {
            ensure!(first <= last, "first address 0x{first:02x} is above last 0x{last:02x}");
            let found = session.scan(first..=last).context("probe bus")?;
            print!("{}", detect_grid(first, last, &found));
            debug!(found = ?found, "detect complete");
        }
        BusCommand::Get {
            address,
            register,
            word,
        } => match (register, word) {
            (None, true) => bail!("--word needs a register"),
            (None, false) => {
                let value = session.read_byte(address).context("read byte")?;
                println!("0x{value:02x}");
            }
            (Some(register), false) => {
                let value = session
                    .read_byte_data(address, register)
                    .context("read byte data")?;
                println!("0x{value:02x}");
            }
            (Some(register), true) => {
                let value = session
                    .read_word_data(address, register)
                    .context("read word data")?;
                println!("0x{value:04x}");
            }
        },
        BusCommand::Set {
            address,
            register,
            value,
            word,
        } => match (value, word) {
            (None, true) => bail!("--word needs a register and a value"),
            (None, false) => session
                .write_byte(address, register)
                .context("write byte")?,
            (Some(value), false) => {
                let value = u8::try_from(value)
                    .with_context(|| format!("value 0x{value:x} does not fit in a byte"))?;
                session
                    .write_byte_data(address, register, value)
                    .context("write byte data")?;
            }
            (Some(value), true) => session
                .write_word_data(address, register, value)
                .context("write word data")?,
        },
        BusCommand::Baudrate { rate_khz } => {
            session.set_baudrate(rate_khz).context("set baudrate")?;
            info!(rate_khz, "I2C clock set");
        }
        BusCommand::Bootloader => {
            session.start_bootloader().context("start bootloader")?;
            info!("adapter is restarting into its bootloader");
        }
    }
    Ok(())
}

/// Render probe results the way i2cdetect does: one row per 16 addresses,
/// `--` for silence, blanks outside the probed range.
fn detect_grid(first: u8, last: u8, found: &[u8]) -> String {
    let mut out = String::from("    ");
    for col in 0..16 {
        let _ = write!(out, "  {col:x}");
    }
    out.push('\n');
    for row in (0..=MAX_ADDRESS).step_by(16) {
        let _ = write!(out, "{row:02x}:");
        for address in row..row + 16 {
            if address < first || address > last {
                out.push_str("   ");
            } else if found.contains(&address) {
                let _ = write!(out, " {address:02x}");
            } else {
                out.push_str(" --");
            }
        }
        out.push('\n');
    }
    out
}

fn parse_number<T: TryFrom<u64>>(input: &str) -> Result<T, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse::<u64>(),
    }
    .map_err(|err| err.to_string())?;
    T::try_from(parsed).map_err(|_| format!("{input} is out of range"))
}

fn parse_address(input: &str) -> Result<u8, String> {
    let address = parse_number::<u8>(input)?;
    if address > MAX_ADDRESS {
        return Err(format!("{input} is not a 7-bit address"));
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_number::<u16>("0x5237"), Ok(0x5237));
        assert_eq!(parse_number::<u16>("0XFF"), Ok(0xFF));
        assert_eq!(parse_number::<u8>("42"), Ok(42));
        assert!(parse_number::<u8>("0x100").is_err());
        assert!(parse_number::<u8>("nope").is_err());
    }

    #[test]
    fn addresses_are_seven_bit() {
        assert_eq!(parse_address("0x7f"), Ok(0x7F));
        assert!(parse_address("0x80").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_word_write() {
        let args = Args::parse_from(["i2cmp", "set", "0x50", "0x10", "0x1234", "--word"]);
        assert_eq!(args.vendor_id, i2cmp_proto::VENDOR_ID);
        assert_eq!(args.timeout_ms, 1000);
        match args.command {
            Command::Bus(BusCommand::Set {
                address,
                register,
                value,
                word,
            }) => {
                assert_eq!((address, register, value, word), (0x50, 0x10, Some(0x1234), true));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn list_is_separate_from_bus_commands() {
        let args = Args::parse_from(["i2cmp", "--vendor-id", "0x1234", "list"]);
        assert_eq!(args.vendor_id, 0x1234);
        assert!(matches!(args.command, Command::List));

        let args = Args::parse_from(["i2cmp", "detect", "--first", "0x08"]);
        match args.command {
            Command::Bus(BusCommand::Detect { first, last }) => assert_eq!((first, last), (0x08, 0x77)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn grid_marks_found_and_skipped_addresses() {
        let grid = detect_grid(0x03, 0x77, &[0x3C, 0x50]);
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].ends_with(" f"));
        assert_eq!(lines[1], "00:          -- -- -- -- -- -- -- -- -- -- -- -- --");
        assert!(lines[4].contains(" 3c"));
        assert!(lines[6].starts_with("50: 50 --"));
        assert!(lines[8].ends_with(" --                        "));
    }
}
