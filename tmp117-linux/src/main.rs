use clap::{Parser, Subcommand};
use embedded_hal::delay::DelayNs;
use tmp117::{AlertLimits, Averaging, ConversionCycle, ConversionMode, Tmp117, Tmp117Builder};

/// Read a TMP117 temperature sensor over Linux I2C
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to I2C bus (e.g., /dev/i2c-1)
    #[arg(short, long)]
    path: String,
    /// 7-bit device address
    #[arg(short, long, default_value_t = 0x48, value_parser = parse_address)]
    address: u8,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print continuous conversion results (default)
    Read,
    /// Take single measurements from shutdown
    Oneshot,
    /// Program alert limits and watch the alert flags
    Limits {
        /// High limit in °C
        #[arg(long, default_value_t = 25.0, allow_negative_numbers = true)]
        high: f32,
        /// Low limit in °C
        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        low: f32,
    },
    /// Apply a temperature offset and print results
    Offset {
        /// Offset in °C
        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        value: f32,
    },
}

fn parse_address(s: &str) -> Result<u8, String> {
    let value = match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| e.to_string())?;
    if value > 0x7f {
        Err(format!("{value:#x} is not a 7-bit address"))
    } else {
        Ok(value)
    }
}

type Sensor = Tmp117<linux_embedded_hal::I2cdev>;

fn continuous(sensor: &mut Sensor, delay: &mut impl DelayNs) {
    sensor
        .set_conversion(
            ConversionMode::Continuous,
            Averaging::X8,
            ConversionCycle::Ms1000,
        )
        .expect("Failed to configure conversions");
    let wait = sensor.minimum_wait_us().unwrap_or(1_000_000);
    loop {
        delay.delay_us(wait);
        match sensor.read_temperature() {
            Ok(t) => log::info!("Temperature: {:.2} °C", t.to_num::<f32>()),
            Err(e) => log::error!("Read failed: {e:?}"),
        }
    }
}

fn oneshot(sensor: &mut Sensor, delay: &mut impl DelayNs) {
    sensor
        .set_averaging_and_cycle(Averaging::X8, ConversionCycle::Ms1000)
        .expect("Failed to configure averaging");
    loop {
        sensor
            .set_mode(ConversionMode::OneShot)
            .expect("Failed to start conversion");
        delay.delay_us(sensor.minimum_wait_us().unwrap_or(125_000));
        loop {
            match sensor.read_temperature() {
                Ok(t) => {
                    log::info!("Single measurement: {:.2} °C", t.to_num::<f32>());
                    break;
                }
                Err(tmp117::Tmp117Error::ConversionNotReady) => delay.delay_ms(1),
                Err(e) => {
                    log::error!("Read failed: {e:?}");
                    break;
                }
            }
        }
        delay.delay_ms(1000);
    }
}

fn limits(sensor: &mut Sensor, delay: &mut impl DelayNs, high: f32, low: f32) {
    sensor
        .set_alert_limits(AlertLimits::new(high, low))
        .expect("Failed to set alert limits");
    let limits = sensor
        .read_alert_limits()
        .expect("Failed to read alert limits");
    log::info!("High limit: {} °C", limits.high);
    log::info!("Low limit: {} °C", limits.low);
    if let Ok(cfg) = sensor.read_configuration() {
        log::info!("Alert mode: {:?}", cfg.alert_mode());
    }
    loop {
        match sensor.read_temperature() {
            Ok(t) => log::info!("Temperature: {:.2} °C", t.to_num::<f32>()),
            Err(e) => log::error!("Read failed: {e:?}"),
        }
        match sensor.read_alert_flags() {
            Ok(flags) => {
                log::info!("High alert: {}", flags.high_alert);
                log::info!("Low alert: {}", flags.low_alert);
            }
            Err(e) => log::error!("Flag read failed: {e:?}"),
        }
        delay.delay_ms(1000);
    }
}

fn offset(sensor: &mut Sensor, delay: &mut impl DelayNs, value: f32) {
    let t = sensor
        .read_temperature()
        .expect("Failed to read temperature");
    log::info!("Temperature without offset: {:.2} °C", t.to_num::<f32>());
    sensor.set_offset(value).expect("Failed to set offset");
    loop {
        delay.delay_ms(1000);
        match sensor.read_temperature() {
            Ok(t) => log::info!("Temperature w/ offset: {:.2} °C", t.to_num::<f32>()),
            Err(e) => log::error!("Read failed: {e:?}"),
        }
    }
}

fn main() {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();
    // Open the I2C bus
    let i2c = linux_embedded_hal::I2cdev::new(&args.path).expect("Failed to open I2C device");
    let mut delay = linux_embedded_hal::Delay;
    // Create a TMP117 instance, checking the device ID
    let mut sensor = Tmp117Builder::default()
        .with_address(args.address)
        .build(i2c)
        .expect("Failed to find a TMP117");
    match sensor.serial_number() {
        Ok(serial) => log::info!("Serial number: {:02x?}", serial),
        Err(e) => log::warn!("Could not read serial number: {e:?}"),
    }
    match args.command.unwrap_or(Command::Read) {
        Command::Read => continuous(&mut sensor, &mut delay),
        Command::Oneshot => oneshot(&mut sensor, &mut delay),
        Command::Limits { high, low } => limits(&mut sensor, &mut delay, high, low),
        Command::Offset { value } => offset(&mut sensor, &mut delay, value),
    }
}
