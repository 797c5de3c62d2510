use bitfield_struct::bitfield;
use fixed::types::I9F7;

/// A 16-bit register word as transported over the bus.
pub type RawWord = u16;

/// Temperature in degrees Celsius.
///
/// Two's complement with 7 fractional bits, i.e. one LSB is 7.8125 m°C and
/// the representable range is -256 °C to 255.9921875 °C.
pub type Temperature = I9F7;

/// Resolution of every temperature-format register, in degrees Celsius.
pub const RESOLUTION_CELSIUS: f32 = 0.0078125;

/// Device code found in bits 11:0 of the device ID register.
pub const TMP117_DEVICE_ID: u16 = 0x117;

/// Register pointers of the TMP117.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAddress {
    /// Temperature result (RO).
    Temperature = 0x00,
    /// Configuration and status (RW).
    Configuration = 0x01,
    /// High limit (RW).
    HighLimit = 0x02,
    /// Low limit (RW).
    LowLimit = 0x03,
    /// EEPROM unlock (RW).
    EepromUnlock = 0x04,
    /// General purpose EEPROM 1 (RW).
    Eeprom1 = 0x05,
    /// General purpose EEPROM 2 (RW).
    Eeprom2 = 0x06,
    /// Temperature offset (RW).
    TemperatureOffset = 0x07,
    /// General purpose EEPROM 3 (RW).
    Eeprom3 = 0x08,
    /// Device ID (RO).
    DeviceId = 0x0f,
}

/// A Celsius value that does not fit the 16-bit temperature format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureOutOfRange;

/// Decode a temperature-format register word.
///
/// Every word is valid: `0x7fff` is 255.9921875 °C and `0x8000` is -256 °C.
pub fn decode_temperature(raw: RawWord) -> Temperature {
    Temperature::from_bits(raw as i16)
}

/// Encode a temperature into its register word.
pub fn encode_temperature(t: Temperature) -> RawWord {
    t.to_bits() as u16
}

/// Encode a Celsius value into a register word, rounding to the nearest LSB.
///
/// NaN and values outside `[-256.0, 255.9921875]` (after rounding) are rejected.
pub fn encode_celsius(celsius: f32) -> Result<RawWord, TemperatureOutOfRange> {
    Temperature::checked_from_num(celsius)
        .map(encode_temperature)
        .ok_or(TemperatureOutOfRange)
}

/// Conversion mode (MOD\[1:0\]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Conversions repeat at the configured cycle time.
    Continuous,
    /// No conversions, lowest power. Reset state after a one-shot completes.
    Shutdown,
    /// A single conversion, after which the device returns to [`ConversionMode::Shutdown`].
    OneShot,
}

impl ConversionMode {
    const fn into_bits(self) -> u8 {
        match self {
            Self::Continuous => 0b00,
            Self::Shutdown => 0b01,
            Self::OneShot => 0b11,
        }
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0b01 => Self::Shutdown,
            0b11 => Self::OneShot,
            // 0b10 reads back as continuous conversion as well
            _ => Self::Continuous,
        }
    }
}

/// Number of conversions averaged before the result register updates (AVG\[1:0\]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Averaging {
    /// No averaging.
    X1,
    /// 8 averaged conversions (power-on default).
    X8,
    /// 32 averaged conversions.
    X32,
    /// 64 averaged conversions.
    X64,
}

impl Averaging {
    /// All averaging levels, in register order.
    pub const ALL: [Averaging; 4] = [Self::X1, Self::X8, Self::X32, Self::X64];

    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::X1,
            1 => Self::X8,
            2 => Self::X32,
            _ => Self::X64,
        }
    }

    /// Active conversion time in microseconds, including averaging.
    pub const fn conversion_time_us(&self) -> u32 {
        match self {
            Self::X1 => 15_500,
            Self::X8 => 125_000,
            Self::X32 => 500_000,
            Self::X64 => 1_000_000,
        }
    }
}

/// Conversion cycle time (CONV\[2:0\]), named after its nominal period.
///
/// The effective period is stretched to the active conversion time of the
/// averaging level:
///
/// | CONV | AVG 1x  | AVG 8x | AVG 32x | AVG 64x |
/// |------|---------|--------|---------|---------|
/// | 000  | 15.5 ms | 125 ms | 500 ms  | 1 s     |
/// | 001  | 125 ms  | 125 ms | 500 ms  | 1 s     |
/// | 010  | 250 ms  | 250 ms | 500 ms  | 1 s     |
/// | 011  | 500 ms  | 500 ms | 500 ms  | 1 s     |
/// | 100  | 1 s     | 1 s    | 1 s     | 1 s     |
/// | 101  | 4 s     | 4 s    | 4 s     | 4 s     |
/// | 110  | 8 s     | 8 s    | 8 s     | 8 s     |
/// | 111  | 16 s    | 16 s   | 16 s    | 16 s    |
///
/// The driver refuses the stretched cells instead of letting the device clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionCycle {
    /// 15.5 ms
    Ms15_5,
    /// 125 ms
    Ms125,
    /// 250 ms
    Ms250,
    /// 500 ms
    Ms500,
    /// 1 s (power-on default)
    Ms1000,
    /// 4 s
    Ms4000,
    /// 8 s
    Ms8000,
    /// 16 s
    Ms16000,
}

impl ConversionCycle {
    /// All cycle times, in register order.
    pub const ALL: [ConversionCycle; 8] = [
        Self::Ms15_5,
        Self::Ms125,
        Self::Ms250,
        Self::Ms500,
        Self::Ms1000,
        Self::Ms4000,
        Self::Ms8000,
        Self::Ms16000,
    ];

    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::Ms15_5,
            1 => Self::Ms125,
            2 => Self::Ms250,
            3 => Self::Ms500,
            4 => Self::Ms1000,
            5 => Self::Ms4000,
            6 => Self::Ms8000,
            _ => Self::Ms16000,
        }
    }

    /// Nominal period in microseconds.
    pub const fn nominal_us(&self) -> u32 {
        match self {
            Self::Ms15_5 => 15_500,
            Self::Ms125 => 125_000,
            Self::Ms250 => 250_000,
            Self::Ms500 => 500_000,
            Self::Ms1000 => 1_000_000,
            Self::Ms4000 => 4_000_000,
            Self::Ms8000 => 8_000_000,
            Self::Ms16000 => 16_000_000,
        }
    }

    /// Whether the nominal period leaves room for the averaging level.
    pub const fn supports(&self, averaging: Averaging) -> bool {
        self.nominal_us() >= averaging.conversion_time_us()
    }

    /// Period between results in microseconds for the given averaging.
    pub const fn effective_us(&self, averaging: Averaging) -> u32 {
        let nominal = self.nominal_us();
        let active = averaging.conversion_time_us();
        if nominal > active { nominal } else { active }
    }
}

/// Thermal/alert mode select (T/nA).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    /// Window comparator. Alert flags latch until the configuration register is read.
    Alert,
    /// Hysteresis comparator. The high flag tracks the temperature, low flag stays 0.
    Therm,
}

impl AlertMode {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        if value & 1 == 0 { Self::Alert } else { Self::Therm }
    }
}

/// ALERT pin polarity (POL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Active low (power-on default).
    ActiveLow,
    /// Active high.
    ActiveHigh,
}

impl Polarity {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        if value & 1 == 0 {
            Self::ActiveLow
        } else {
            Self::ActiveHigh
        }
    }
}

/// What the ALERT pin reflects (DR/Alert).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPinSelect {
    /// The alert flags.
    Alert,
    /// The data ready flag.
    DataReady,
}

impl AlertPinSelect {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        if value & 1 == 0 {
            Self::Alert
        } else {
            Self::DataReady
        }
    }
}

/// # Configuration register
///
/// Holds the conversion settings, the ALERT pin setup and the status flags.
/// Reading it clears the data ready flag and, in [`AlertMode::Alert`], both
/// alert flags. The power-on value is `0x0220`: continuous conversion,
/// 8x averaging and a 1 s cycle.
///
/// Fields are changed with the generated `with_*` setters, which leave every
/// other bit of the word untouched.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct Configuration {
    #[bits(1)]
    __: u8,
    /// Software reset. Self-clearing, always reads back 0.
    pub soft_reset: bool,
    /// ALERT pin source.
    #[bits(1)]
    pub alert_pin: AlertPinSelect,
    /// ALERT pin polarity.
    #[bits(1)]
    pub polarity: Polarity,
    /// Thermal/alert mode.
    #[bits(1)]
    pub alert_mode: AlertMode,
    /// Conversion averaging.
    #[bits(2, default = Averaging::X8)]
    pub averaging: Averaging,
    /// Conversion cycle time.
    #[bits(3, default = ConversionCycle::Ms1000)]
    pub cycle: ConversionCycle,
    /// Conversion mode.
    #[bits(2)]
    pub mode: ConversionMode,
    /// EEPROM busy, from programming or power-up.
    #[bits(1, access = RO)]
    pub eeprom_busy: bool,
    /// Set when a conversion completes. Cleared by reading this register or
    /// the temperature register.
    #[bits(1, access = RO)]
    pub data_ready: bool,
    /// Set when a result is below the low limit.
    #[bits(1, access = RO)]
    pub low_alert: bool,
    /// Set when a result is above the high limit.
    #[bits(1, access = RO)]
    pub high_alert: bool,
}

// read-only flags and the self-clearing reset bit
const CONFIGURATION_WRITE_MASK: u16 = 0x0ffd;

impl Configuration {
    /// The status flags carried in the upper bits.
    pub fn alert_flags(&self) -> AlertFlags {
        AlertFlags {
            high_alert: self.high_alert(),
            low_alert: self.low_alert(),
            data_ready: self.data_ready(),
        }
    }

    /// The word with read-only flags and the reset bit cleared, fit for writing back.
    pub fn writable(&self) -> Self {
        Self::from_bits(self.into_bits() & CONFIGURATION_WRITE_MASK)
    }

    /// Shortest time in microseconds before a new result can be expected
    /// after this configuration is written. `None` in shutdown.
    pub fn minimum_wait_us(&self) -> Option<u32> {
        match self.mode() {
            ConversionMode::OneShot => Some(self.averaging().conversion_time_us()),
            ConversionMode::Continuous => Some(self.cycle().effective_us(self.averaging())),
            ConversionMode::Shutdown => None,
        }
    }
}

/// Status bits of the configuration register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlertFlags {
    /// A result exceeded the high limit.
    pub high_alert: bool,
    /// A result fell below the low limit.
    pub low_alert: bool,
    /// A new result is waiting in the temperature register.
    pub data_ready: bool,
}

impl AlertFlags {
    pub(crate) fn merge(self, other: AlertFlags) -> AlertFlags {
        AlertFlags {
            high_alert: self.high_alert || other.high_alert,
            low_alert: self.low_alert || other.low_alert,
            data_ready: self.data_ready || other.data_ready,
        }
    }
}

/// High and low alert limits in °C.
///
/// The device compares each result against both registers independently and
/// does not require `high >= low`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertLimits {
    /// High limit.
    pub high: f32,
    /// Low limit.
    pub low: f32,
}

impl AlertLimits {
    /// A pair of limits.
    pub fn new(high: f32, low: f32) -> Self {
        Self { high, low }
    }

    /// The high limit is below the low limit.
    pub fn is_inverted(&self) -> bool {
        self.high < self.low
    }
}

impl From<(Temperature, Temperature)> for AlertLimits {
    fn from((high, low): (Temperature, Temperature)) -> Self {
        Self {
            high: high.to_num(),
            low: low.to_num(),
        }
    }
}

/// Replace the conversion fields of `existing`, keeping every other bit.
pub fn pack_configuration(
    mode: ConversionMode,
    averaging: Averaging,
    cycle: ConversionCycle,
    existing: Configuration,
) -> RawWord {
    existing
        .with_mode(mode)
        .with_averaging(averaging)
        .with_cycle(cycle)
        .into_bits()
}

/// Split a configuration word into its conversion fields and status flags.
pub fn unpack_configuration(
    raw: RawWord,
) -> (ConversionMode, Averaging, ConversionCycle, AlertFlags) {
    let cfg = Configuration::from_bits(raw);
    (cfg.mode(), cfg.averaging(), cfg.cycle(), cfg.alert_flags())
}

/// Device ID register.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct DeviceId {
    /// Device code, `0x117` for the TMP117.
    #[bits(12)]
    pub device_code: u16,
    /// Silicon revision.
    #[bits(4)]
    pub revision: u8,
}

impl DeviceId {
    /// Whether the code identifies a TMP117, regardless of revision.
    pub fn is_tmp117(&self) -> bool {
        self.device_code() == TMP117_DEVICE_ID
    }
}

/// Decode the device ID register.
pub fn decode_device_id(raw: RawWord) -> DeviceId {
    DeviceId::from_bits(raw)
}

/// EEPROM unlock register.
///
/// While unlocked, writes to the configuration, limit, offset and EEPROM
/// registers also program the EEPROM, and the values become power-on defaults.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct EepromUnlock {
    #[bits(14)]
    __: u16,
    /// Programming in progress, mirrors [`Configuration::eeprom_busy`].
    #[bits(1, access = RO)]
    pub busy: bool,
    /// EEPROM unlocked for programming.
    pub unlock: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODE_BITS: u16 = 0b11 << 10;
    const CYCLE_BITS: u16 = 0b111 << 7;
    const AVG_BITS: u16 = 0b11 << 5;

    #[test]
    fn temperature_boundaries() {
        assert_eq!(decode_temperature(0x7fff).to_num::<f32>(), 255.992_187_5);
        assert_eq!(decode_temperature(0x8000).to_num::<f32>(), -256.0);
        assert_eq!(decode_temperature(0x0000), Temperature::ZERO);
        assert_eq!(decode_temperature(0x0001).to_num::<f32>(), RESOLUTION_CELSIUS);
        assert_eq!(decode_temperature(0xffff).to_num::<f32>(), -RESOLUTION_CELSIUS);
        // 25 °C
        assert_eq!(decode_temperature(0x0c80).to_num::<f32>(), 25.0);
    }

    #[test]
    fn temperature_round_trip_is_monotonic_and_bounded() {
        let mut previous = None;
        for bits in i16::MIN..=i16::MAX {
            let raw = bits as u16;
            let t = decode_temperature(raw);
            let again = encode_celsius(t.to_num::<f32>()).unwrap();
            let diff = (decode_temperature(again) - t).abs();
            assert!(diff.to_num::<f32>() <= RESOLUTION_CELSIUS);
            assert_eq!(encode_temperature(t), raw);
            if let Some(p) = previous {
                assert!(t > p);
            }
            previous = Some(t);
        }
    }

    #[test]
    fn celsius_encoding_limits() {
        assert_eq!(encode_celsius(25.0), Ok(0x0c80));
        assert_eq!(encode_celsius(-256.0), Ok(0x8000));
        assert_eq!(encode_celsius(255.992_187_5), Ok(0x7fff));
        assert_eq!(encode_celsius(10.004), Ok(0x0501));
        assert_eq!(encode_celsius(256.0), Err(TemperatureOutOfRange));
        assert_eq!(encode_celsius(-256.01), Err(TemperatureOutOfRange));
        assert_eq!(encode_celsius(f32::NAN), Err(TemperatureOutOfRange));
        assert_eq!(encode_celsius(f32::INFINITY), Err(TemperatureOutOfRange));
    }

    #[test]
    fn power_on_configuration() {
        let cfg = Configuration::new();
        assert_eq!(cfg.into_bits(), 0x0220);
        assert_eq!(
            unpack_configuration(0x0220),
            (
                ConversionMode::Continuous,
                Averaging::X8,
                ConversionCycle::Ms1000,
                AlertFlags::default()
            )
        );
    }

    #[test]
    fn single_field_mutation_keeps_foreign_bits() {
        for raw in 0..=u16::MAX {
            let cfg = Configuration::from_bits(raw);
            let (mode, averaging, cycle, _) = unpack_configuration(raw);
            for m in [
                ConversionMode::Continuous,
                ConversionMode::Shutdown,
                ConversionMode::OneShot,
            ] {
                let packed = pack_configuration(m, averaging, cycle, cfg);
                assert_eq!(packed & !MODE_BITS, raw & !MODE_BITS);
                assert_eq!(Configuration::from_bits(packed).mode(), m);
            }
            for a in Averaging::ALL {
                let packed = pack_configuration(mode, a, cycle, cfg);
                assert_eq!(packed & !(AVG_BITS | MODE_BITS), raw & !(AVG_BITS | MODE_BITS));
                assert_eq!(cfg.with_averaging(a).into_bits() & !AVG_BITS, raw & !AVG_BITS);
            }
            for c in ConversionCycle::ALL {
                let packed = pack_configuration(mode, averaging, c, cfg);
                assert_eq!(packed & !(CYCLE_BITS | MODE_BITS), raw & !(CYCLE_BITS | MODE_BITS));
                assert_eq!(cfg.with_cycle(c).into_bits() & !CYCLE_BITS, raw & !CYCLE_BITS);
            }
            // MOD = 0b10 is an alias of continuous and is rewritten as 0b00
            if raw & MODE_BITS != 0b10 << 10 {
                assert_eq!(pack_configuration(mode, averaging, cycle, cfg), raw);
            }
        }
    }

    #[test]
    fn flags_and_writable_word() {
        let cfg = Configuration::from_bits(0xe222);
        assert_eq!(
            cfg.alert_flags(),
            AlertFlags {
                high_alert: true,
                low_alert: true,
                data_ready: true,
            }
        );
        assert!(cfg.soft_reset());
        assert_eq!(cfg.writable().into_bits(), 0x0220);
        assert!(Configuration::from_bits(0x1000).eeprom_busy());
    }

    #[test]
    fn cycle_table() {
        use Averaging::*;
        use ConversionCycle::*;
        assert!(Ms15_5.supports(X1));
        assert!(!Ms15_5.supports(X8));
        assert!(Ms125.supports(X8));
        assert!(!Ms250.supports(X32));
        assert!(Ms500.supports(X32));
        assert!(!Ms500.supports(X64));
        assert!(Ms1000.supports(X64));
        assert_eq!(Ms15_5.effective_us(X64), 1_000_000);
        assert_eq!(Ms250.effective_us(X8), 250_000);
        assert_eq!(Ms16000.effective_us(X1), 16_000_000);
        for c in ConversionCycle::ALL {
            assert!(c.supports(X1));
        }
    }

    #[test]
    fn minimum_wait() {
        let cfg = Configuration::new();
        assert_eq!(cfg.minimum_wait_us(), Some(1_000_000));
        let cfg = cfg.with_mode(ConversionMode::OneShot);
        assert_eq!(cfg.minimum_wait_us(), Some(125_000));
        let cfg = cfg.with_mode(ConversionMode::Shutdown);
        assert_eq!(cfg.minimum_wait_us(), None);
    }

    #[test]
    fn device_id() {
        let id = decode_device_id(0x0117);
        assert!(id.is_tmp117());
        assert_eq!(id.revision(), 0);
        let id = decode_device_id(0x1117);
        assert!(id.is_tmp117());
        assert_eq!(id.revision(), 1);
        assert!(!decode_device_id(0x0116).is_tmp117());
    }

    #[test]
    fn eeprom_unlock_bits() {
        assert_eq!(EepromUnlock::new().with_unlock(true).into_bits(), 0x8000);
        assert!(EepromUnlock::from_bits(0x4000).busy());
    }
}
