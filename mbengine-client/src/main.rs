//! Command-line Modbus master

use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use mbengine::*;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("{0}")]
    BadInt(#[from] ParseIntError),
    #[error("bad character in bit string: {0}")]
    BadCharInBitString(char),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Request(#[from] RequestError),
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Framing {
    Rtu,
    Tcp,
}

#[derive(Parser)]
#[command(name = "mbengine-client")]
#[command(about = "A command line program for making Modbus requests using the mbengine crate")]
#[command(version)]
struct Cli {
    #[arg(long, value_enum, default_value = "tcp", help = "framing on the medium")]
    protocol: Framing,

    #[arg(long, default_value = "127.0.0.1", help = "TCP host name or address")]
    host: String,

    #[arg(long, default_value = "502", help = "TCP port")]
    port: u16,

    #[arg(long, default_value = "", help = "serial device, e.g. /dev/ttyUSB0")]
    device: String,

    #[arg(long, default_value = "9600", help = "serial baud rate")]
    baud: u32,

    #[arg(short = 'i', long, default_value = "1", help = "node address of the equipment")]
    id: u8,

    #[arg(short = 't', long, default_value = "1.0", help = "I/O timeout in seconds")]
    timeout: f64,

    #[arg(long, default_value = "", help = "diagnostic log file for serial failures")]
    log_file: String,

    #[arg(long, help = "only reject RTU frames whose two CRC bytes are both wrong")]
    legacy_crc: bool,

    #[arg(short = 'r', long, default_value = "0", help = "retries after a transport failure")]
    retries: u16,

    #[arg(short = 'p', long, help = "optional polling period in milliseconds")]
    period: Option<u64>,

    #[arg(short = 'v', long, help = "trace frames and bytes")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(name = "rc", about = "read a single coil")]
    ReadCoilStatus(AddressArgs),

    #[command(name = "rmc", about = "read multiple coils")]
    ReadMultipleCoils(ReadArgs),

    #[command(name = "ris", about = "read input status (discrete inputs)")]
    ReadInputStatus(ReadArgs),

    #[command(name = "rhr", about = "read holding registers")]
    ReadHoldingRegisters(ReadArgs),

    #[command(name = "rir", about = "read input registers")]
    ReadInputRegisters(ReadArgs),

    #[command(name = "fsc", about = "force single coil")]
    ForceSingleCoil(WriteSingleCoilArgs),

    #[command(name = "psr", about = "preset single register")]
    PresetSingleRegister(WriteSingleRegisterArgs),

    #[command(name = "psrb", about = "preset single register on every node")]
    PresetSingleRegisterBroadcast(WriteSingleRegisterArgs),

    #[command(name = "fmc", about = "force multiple coils")]
    ForceMultipleCoils(WriteMultipleCoilsArgs),

    #[command(name = "pmr", about = "preset multiple registers")]
    PresetMultipleRegisters(WriteMultipleRegistersArgs),

    #[command(name = "mwr", about = "mask write register")]
    MaskWriteRegister(MaskWriteArgs),

    #[command(name = "rwr", about = "write then read registers")]
    ReadWriteRegisters(ReadWriteArgs),

    #[command(name = "res", about = "read exception status")]
    ReadExceptionStatus,

    #[command(name = "cec", about = "fetch communication event counter")]
    FetchCommEventCounter,
}

#[derive(Args)]
struct AddressArgs {
    #[arg(short = 'a', long, help = "the address")]
    address: u16,
}

#[derive(Args)]
struct ReadArgs {
    #[arg(short = 's', long, help = "the starting address")]
    start: u16,

    #[arg(short = 'q', long, help = "quantity of values")]
    quantity: u16,
}

#[derive(Args)]
struct WriteSingleCoilArgs {
    #[arg(short = 'a', long, help = "the address of the coil")]
    address: u16,

    #[arg(short = 'v', long, help = "the value of the coil (true or false)")]
    value: bool,
}

#[derive(Args)]
struct WriteSingleRegisterArgs {
    #[arg(short = 'a', long, help = "the address of the register")]
    address: u16,

    #[arg(short = 'v', long, help = "the value of the register")]
    value: u16,
}

#[derive(Args)]
struct WriteMultipleCoilsArgs {
    #[arg(short = 's', long, help = "the starting address of the coils")]
    start: u16,

    #[arg(short = 'v', long, help = "the values of the coils specified as a string of 1 and 0 (e.g. 10100011)")]
    values: String,
}

#[derive(Args)]
struct WriteMultipleRegistersArgs {
    #[arg(short = 's', long, help = "the starting address of the registers")]
    start: u16,

    #[arg(short = 'v', long, help = "the values of the registers specified as a comma delimited list (e.g. 1,4,7)")]
    values: String,
}

#[derive(Args)]
struct MaskWriteArgs {
    #[arg(short = 'a', long, help = "the address of the register")]
    address: u16,

    #[arg(long, help = "the AND mask")]
    and_mask: u16,

    #[arg(long, help = "the OR mask")]
    or_mask: u16,
}

#[derive(Args)]
struct ReadWriteArgs {
    #[arg(long, help = "the starting address of the read")]
    read_start: u16,

    #[arg(long, help = "quantity of registers to read")]
    read_quantity: u16,

    #[arg(long, help = "the starting address of the write")]
    write_start: u16,

    #[arg(short = 'v', long, help = "the values to write as a comma delimited list")]
    values: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    if let Err(ref e) = run().await {
        println!("error: {e}");
        if let Error::Request(err) = e {
            if let Some(hint) = err.hint() {
                println!("hint: {hint}");
            }
        }
    }

    Ok(())
}

fn engine_config(cli: &Cli) -> EngineConfig {
    EngineConfig {
        protocol: match cli.protocol {
            Framing::Rtu => Protocol::Rtu,
            Framing::Tcp => Protocol::Tcp,
        },
        node: cli.id,
        serial_device: cli.device.clone(),
        baud_rate: cli.baud,
        serial_timeout: cli.timeout,
        log_file: cli.log_file.clone(),
        crc_check: if cli.legacy_crc {
            CrcCheck::Legacy
        } else {
            CrcCheck::Strict
        },
        tcp_host: cli.host.clone(),
        tcp_port: cli.port,
        tcp_connect_timeout: cli.timeout,
        tcp_timeout: cli.timeout,
        retry_count: cli.retries,
        retry_sleep_ms: 100,
        ..Default::default()
    }
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    let decode = if cli.verbose {
        DecodeLevel::new(FrameDecodeLevel::Payload, PhysDecodeLevel::Length)
    } else {
        DecodeLevel::nothing()
    };

    let device = Device::from_config(&engine_config(&cli), decode)?;
    device.engine().connect().await?;
    tracing::info!("{}", device.status().await);

    match cli.period {
        None => run_command(&cli.command, &device).await,
        Some(period_ms) => {
            let period = Duration::from_millis(period_ms);
            loop {
                if let Err(err) = run_command(&cli.command, &device).await {
                    tracing::warn!("{err}");
                }
                tokio::time::sleep(period).await
            }
        }
    }
}

async fn run_command(command: &Command, device: &Device) -> Result<(), Error> {
    match command {
        Command::ReadCoilStatus(args) => {
            let value = device.read_coil_status(args.address).await?;
            println!("index: {} value: {}", args.address, value);
        }
        Command::ReadMultipleCoils(args) => {
            let values = device
                .read_multiple_coils_status(args.start, args.quantity)
                .await?;
            print_values(args.start, &values);
        }
        Command::ReadInputStatus(args) => {
            let values = device.read_input_status(args.start, args.quantity).await?;
            print_values(args.start, &values);
        }
        Command::ReadHoldingRegisters(args) => {
            let values = device
                .read_holding_registers(args.start, args.quantity)
                .await?;
            print_values(args.start, &values);
        }
        Command::ReadInputRegisters(args) => {
            let values = device
                .read_input_registers(args.start, args.quantity)
                .await?;
            print_values(args.start, &values);
        }
        Command::ForceSingleCoil(args) => {
            device.force_single_coil(args.address, args.value).await?;
        }
        Command::PresetSingleRegister(args) => {
            device
                .preset_single_register(args.address, args.value)
                .await?;
        }
        Command::PresetSingleRegisterBroadcast(args) => {
            device
                .preset_single_register_broadcast(args.address, args.value)
                .await?;
        }
        Command::ForceMultipleCoils(args) => {
            let values = parse_bit_values(&args.values)?;
            device.force_multiple_coils(args.start, &values).await?;
        }
        Command::PresetMultipleRegisters(args) => {
            let values = parse_register_values(&args.values)?;
            device.preset_multiple_registers(args.start, &values).await?;
        }
        Command::MaskWriteRegister(args) => {
            device
                .mask_write_register(args.address, args.and_mask, args.or_mask)
                .await?;
        }
        Command::ReadWriteRegisters(args) => {
            let values = parse_register_values(&args.values)?;
            let read = device
                .read_write_registers(args.read_start, args.read_quantity, args.write_start, &values)
                .await?;
            print_values(args.read_start, &read);
        }
        Command::ReadExceptionStatus => {
            let status = device.read_exception_status().await?;
            println!("exception status: {status:#04X}");
        }
        Command::FetchCommEventCounter => {
            let counter = device.fetch_comm_event_counter().await?;
            println!(
                "status: {:#06X} event count: {}",
                counter.status, counter.event_count
            );
        }
    }
    Ok(())
}

fn print_values<T: std::fmt::Display>(start: u16, values: &[T]) {
    for (index, value) in (start..).zip(values) {
        println!("index: {index} value: {value}")
    }
}

fn parse_bit_values(values_str: &str) -> Result<Vec<bool>, Error> {
    let mut values: Vec<bool> = Vec::new();
    for c in values_str.chars().rev() {
        match c {
            '0' => values.push(false),
            '1' => values.push(true),
            _ => return Err(Error::BadCharInBitString(c)),
        }
    }
    Ok(values)
}

fn parse_register_values(values_str: &str) -> Result<Vec<u16>, ParseIntError> {
    let mut values: Vec<u16> = Vec::new();
    for value in values_str.split(',') {
        values.push(u16::from_str(value.trim())?);
    }
    Ok(values)
}
