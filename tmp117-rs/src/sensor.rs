use crate::{
    AlertFlags, AlertLimits, AlertMode, AlertPinSelect, Averaging, Configuration, ConversionCycle,
    ConversionMode, DeviceId, EepromUnlock, Polarity, RawWord, RegisterAddress, Temperature,
    Tmp117Builder, Tmp117Error, Tmp117Result, decode_device_id, decode_temperature,
    pack_configuration,
    state::{DeviceState, encode_checked, validate_cycle},
    traits::RegisterBus,
};

/// A TMP117 temperature sensor.
///
/// Takes ownership of a bus implementing [`RegisterBus`], which every
/// [`I2c`](embedded_hal::i2c::I2c) bus does. A value of this type only exists
/// for a device whose ID register has been checked.
///
/// Nothing here waits. After starting a conversion, use
/// [`minimum_wait_us`](Tmp117::minimum_wait_us) to decide how long to sleep.
pub struct Tmp117<I> {
    pub(crate) bus: I,
    pub(crate) addr: u8,
    pub(crate) state: DeviceState,
}

impl<I: RegisterBus> Tmp117<I> {
    /// Creates a new instance at the default address (`0x48`) and verifies
    /// the device ID.
    pub fn new(bus: I) -> Tmp117Result<Self, I::Error> {
        Tmp117Builder::default().build(bus)
    }

    pub(crate) fn read_word(&mut self, reg: RegisterAddress) -> Tmp117Result<RawWord, I::Error> {
        let raw = self.bus.read_register(self.addr, reg as u8)?;
        log::trace!("{:#04x}: read {reg:?} = {raw:#06x}", self.addr);
        Ok(raw)
    }

    pub(crate) fn write_word(
        &mut self,
        reg: RegisterAddress,
        value: RawWord,
    ) -> Tmp117Result<(), I::Error> {
        log::trace!("{:#04x}: write {reg:?} = {value:#06x}", self.addr);
        self.bus.write_register(self.addr, reg as u8, value)?;
        Ok(())
    }

    /// Check that the device at the bus address is a TMP117.
    ///
    /// Any revision is accepted.
    pub fn verify_identity(&mut self) -> Tmp117Result<DeviceId, I::Error> {
        let id = decode_device_id(self.read_word(RegisterAddress::DeviceId)?);
        if id.is_tmp117() {
            log::debug!("TMP117 revision {} at {:#04x}", id.revision(), self.addr);
            Ok(id)
        } else {
            Err(Tmp117Error::IdentityMismatch(id))
        }
    }

    /// Read the temperature result.
    ///
    /// While a one-shot conversion is outstanding, the data ready flag is
    /// checked first and [`Tmp117Error::ConversionNotReady`] is returned until
    /// it is set. In continuous or shutdown mode the register is read as is.
    pub fn read_temperature(&mut self) -> Tmp117Result<Temperature, I::Error> {
        if self.state.awaiting_conversion() {
            let live = Configuration::from_bits(self.read_word(RegisterAddress::Configuration)?);
            self.state.observe(live);
            if self.state.awaiting_conversion() {
                return Err(Tmp117Error::ConversionNotReady);
            }
        }
        let raw = self.read_word(RegisterAddress::Temperature)?;
        self.state.result_consumed();
        Ok(decode_temperature(raw))
    }

    /// Read the configuration register.
    ///
    /// Clears the data ready flag, and the alert flags in
    /// [`AlertMode::Alert`]. Cleared alert flags are kept for the next
    /// [`read_alert_flags`](Tmp117::read_alert_flags).
    pub fn read_configuration(&mut self) -> Tmp117Result<Configuration, I::Error> {
        let live = Configuration::from_bits(self.read_word(RegisterAddress::Configuration)?);
        self.state.observe(live);
        Ok(live)
    }

    /// Read and clear the alert and data ready flags.
    pub fn read_alert_flags(&mut self) -> Tmp117Result<AlertFlags, I::Error> {
        let live = Configuration::from_bits(self.read_word(RegisterAddress::Configuration)?);
        Ok(self.state.take_flags(live))
    }

    /// Whether a new result is available.
    ///
    /// Reads the configuration register unless a finished one-shot result is
    /// already known to be waiting.
    pub fn is_conversion_ready(&mut self) -> Tmp117Result<bool, I::Error> {
        if self.state.conversion_ready() {
            return Ok(true);
        }
        let live = Configuration::from_bits(self.read_word(RegisterAddress::Configuration)?);
        let flags = self.state.observe(live);
        Ok(self.state.result_available(flags))
    }

    /// Read-modify-write the configuration register.
    ///
    /// The shadow is loaded from the device on first use. Bits not touched by
    /// `f` are written back as last seen. Starting a one-shot always reads the
    /// register first, clearing a data ready flag from an earlier conversion.
    fn modify_configuration(
        &mut self,
        f: impl FnOnce(Configuration) -> Configuration,
    ) -> Tmp117Result<Configuration, I::Error> {
        let (base, fresh) = match self.state.base() {
            Some(cfg) => (cfg, false),
            None => {
                let live =
                    Configuration::from_bits(self.read_word(RegisterAddress::Configuration)?);
                (self.state.load(live), true)
            }
        };
        let next = f(base);
        if next.mode() == ConversionMode::OneShot && !fresh {
            let live = Configuration::from_bits(self.read_word(RegisterAddress::Configuration)?);
            self.state.observe(live);
        }
        self.write_word(RegisterAddress::Configuration, next.into_bits())?;
        self.state.commit(next);
        Ok(next)
    }

    /// Select the conversion mode.
    ///
    /// Writing [`ConversionMode::OneShot`] starts one conversion, after which
    /// the device drops to shutdown by itself.
    pub fn set_mode(&mut self, mode: ConversionMode) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_mode(mode))?;
        log::debug!("mode set to {mode:?}");
        Ok(())
    }

    /// Last conversion mode known to the host, if the configuration has been
    /// read or written since construction.
    ///
    /// A finished one-shot is only noticed on the next configuration read.
    pub fn mode(&self) -> Option<ConversionMode> {
        self.state.shadow().map(|cfg| cfg.mode())
    }

    /// Set averaging and cycle time.
    ///
    /// Combinations where the cycle is shorter than the averaging takes are
    /// refused with [`Tmp117Error::InvalidCombination`] without any bus access.
    /// A pending one-shot conversion is cancelled.
    pub fn set_averaging_and_cycle(
        &mut self,
        averaging: Averaging,
        cycle: ConversionCycle,
    ) -> Tmp117Result<(), I::Error> {
        validate_cycle(averaging, cycle)?;
        self.modify_configuration(|cfg| cfg.with_averaging(averaging).with_cycle(cycle))?;
        Ok(())
    }

    /// Set mode, averaging and cycle time in one write.
    pub fn set_conversion(
        &mut self,
        mode: ConversionMode,
        averaging: Averaging,
        cycle: ConversionCycle,
    ) -> Tmp117Result<(), I::Error> {
        validate_cycle(averaging, cycle)?;
        self.modify_configuration(|cfg| {
            Configuration::from_bits(pack_configuration(mode, averaging, cycle, cfg))
        })?;
        Ok(())
    }

    /// Microseconds to wait after the last configuration write before a new
    /// result can be expected. `None` in shutdown or before the configuration
    /// is known.
    pub fn minimum_wait_us(&self) -> Option<u32> {
        self.state.shadow().and_then(|cfg| cfg.minimum_wait_us())
    }

    /// Set the thermal/alert mode.
    pub fn set_alert_mode(&mut self, mode: AlertMode) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_alert_mode(mode))?;
        Ok(())
    }

    /// Set the ALERT pin polarity.
    pub fn set_alert_polarity(&mut self, polarity: Polarity) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_polarity(polarity))?;
        Ok(())
    }

    /// Choose what the ALERT pin reports.
    pub fn set_alert_pin(&mut self, select: AlertPinSelect) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_alert_pin(select))?;
        Ok(())
    }

    /// Write the high and low limits, high first.
    ///
    /// Both values are encoded before either is written. The two writes are
    /// not atomic, a comparison between them sees the new high and old low
    /// limit. A high limit below the low limit is accepted by the device and
    /// passed through.
    pub fn set_alert_limits(&mut self, limits: AlertLimits) -> Tmp117Result<(), I::Error> {
        let high = encode_checked(limits.high)?;
        let low = encode_checked(limits.low)?;
        if limits.is_inverted() {
            log::warn!(
                "high limit {} °C is below low limit {} °C",
                limits.high,
                limits.low
            );
        }
        self.write_word(RegisterAddress::HighLimit, high)?;
        self.write_word(RegisterAddress::LowLimit, low)
    }

    /// Write the high limit in °C.
    pub fn set_high_limit(&mut self, celsius: f32) -> Tmp117Result<(), I::Error> {
        let raw = encode_checked(celsius)?;
        self.write_word(RegisterAddress::HighLimit, raw)
    }

    /// Write the low limit in °C.
    pub fn set_low_limit(&mut self, celsius: f32) -> Tmp117Result<(), I::Error> {
        let raw = encode_checked(celsius)?;
        self.write_word(RegisterAddress::LowLimit, raw)
    }

    /// Read both limits.
    pub fn read_alert_limits(&mut self) -> Tmp117Result<AlertLimits, I::Error> {
        let high = decode_temperature(self.read_word(RegisterAddress::HighLimit)?);
        let low = decode_temperature(self.read_word(RegisterAddress::LowLimit)?);
        Ok(AlertLimits::from((high, low)))
    }

    /// Set the offset in °C that the device adds to every following result.
    pub fn set_offset(&mut self, celsius: f32) -> Tmp117Result<(), I::Error> {
        let raw = encode_checked(celsius)?;
        self.write_word(RegisterAddress::TemperatureOffset, raw)
    }

    /// Read the temperature offset.
    pub fn read_offset(&mut self) -> Tmp117Result<Temperature, I::Error> {
        Ok(decode_temperature(
            self.read_word(RegisterAddress::TemperatureOffset)?,
        ))
    }

    /// Trigger a software reset.
    ///
    /// The device reloads its registers from EEPROM, which takes about 2 ms.
    /// The configuration shadow is dropped and re-read on the next change.
    pub fn soft_reset(&mut self) -> Tmp117Result<(), I::Error> {
        let cfg = self.state.base().unwrap_or_default().with_soft_reset(true);
        self.write_word(RegisterAddress::Configuration, cfg.into_bits())?;
        self.state.commit(cfg);
        Ok(())
    }

    /// The 48-bit factory identifier stored in EEPROM1, EEPROM2 and EEPROM3.
    pub fn serial_number(&mut self) -> Tmp117Result<[u8; 6], I::Error> {
        let [a, b] = self.read_word(RegisterAddress::Eeprom1)?.to_be_bytes();
        let [c, d] = self.read_word(RegisterAddress::Eeprom2)?.to_be_bytes();
        let [e, f] = self.read_word(RegisterAddress::Eeprom3)?.to_be_bytes();
        Ok([a, b, c, d, e, f])
    }

    /// Lock or unlock the EEPROM.
    ///
    /// While unlocked, register writes also program their power-on defaults.
    pub fn set_eeprom_unlocked(&mut self, unlock: bool) -> Tmp117Result<(), I::Error> {
        let reg = EepromUnlock::new().with_unlock(unlock);
        self.write_word(RegisterAddress::EepromUnlock, reg.into_bits())
    }

    /// Whether EEPROM programming is in progress.
    pub fn eeprom_busy(&mut self) -> Tmp117Result<bool, I::Error> {
        let reg = EepromUnlock::from_bits(self.read_word(RegisterAddress::EepromUnlock)?);
        Ok(reg.busy())
    }
}

impl<I> Tmp117<I> {
    /// The 7-bit bus address in use.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.bus
    }
}
