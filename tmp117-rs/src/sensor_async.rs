use crate::{
    AlertFlags, AlertLimits, AlertMode, AlertPinSelect, Averaging, Configuration, ConversionCycle,
    ConversionMode, DeviceId, EepromUnlock, Polarity, RawWord, RegisterAddress, Temperature,
    Tmp117Builder, Tmp117Error, Tmp117Result, decode_device_id, decode_temperature,
    pack_configuration,
    state::{DeviceState, encode_checked, validate_cycle},
    traits_async::RegisterBusAsync,
};

/// A TMP117 temperature sensor.
///
/// Takes ownership of a bus implementing [`RegisterBus`], which every
/// [`I2c`](embedded_hal::i2c::I2c) bus does. A value of this type only exists
/// for a device whose ID register has been checked.
///
/// Nothing here waits. After starting a conversion, use
/// [`minimum_wait_us`](Tmp117Async::minimum_wait_us) to decide how long to sleep.
pub struct Tmp117Async<I> {
    pub(crate) bus: I,
    pub(crate) addr: u8,
    pub(crate) state: DeviceState,
}

impl<I: RegisterBusAsync> Tmp117Async<I> {
    /// Creates a new instance at the default address (`0x48`) and verifies
    /// the device ID.
    pub async fn new(bus: I) -> Tmp117Result<Self, I::Error> {
        Tmp117Builder::default().build_async(bus).await
    }

    pub(crate) async fn read_word(
        &mut self,
        reg: RegisterAddress,
    ) -> Tmp117Result<RawWord, I::Error> {
        let raw = self.bus.read_register(self.addr, reg as u8).await?;
        log::trace!("{:#04x}: read {reg:?} = {raw:#06x}", self.addr);
        Ok(raw)
    }

    pub(crate) async fn write_word(
        &mut self,
        reg: RegisterAddress,
        value: RawWord,
    ) -> Tmp117Result<(), I::Error> {
        log::trace!("{:#04x}: write {reg:?} = {value:#06x}", self.addr);
        self.bus.write_register(self.addr, reg as u8, value).await?;
        Ok(())
    }

    /// Check that the device at the bus address is a TMP117.
    ///
    /// Any revision is accepted.
    pub async fn verify_identity(&mut self) -> Tmp117Result<DeviceId, I::Error> {
        let id = decode_device_id(self.read_word(RegisterAddress::DeviceId).await?);
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
    pub async fn read_temperature(&mut self) -> Tmp117Result<Temperature, I::Error> {
        if self.state.awaiting_conversion() {
            let live =
                Configuration::from_bits(self.read_word(RegisterAddress::Configuration).await?);
            self.state.observe(live);
            if self.state.awaiting_conversion() {
                return Err(Tmp117Error::ConversionNotReady);
            }
        }
        let raw = self.read_word(RegisterAddress::Temperature).await?;
        self.state.result_consumed();
        Ok(decode_temperature(raw))
    }

    /// Read the configuration register.
    ///
    /// Clears the data ready flag, and the alert flags in
    /// [`AlertMode::Alert`]. Cleared alert flags are kept for the next
    /// [`read_alert_flags`](Tmp117Async::read_alert_flags).
    pub async fn read_configuration(&mut self) -> Tmp117Result<Configuration, I::Error> {
        let live =
            Configuration::from_bits(self.read_word(RegisterAddress::Configuration).await?);
        self.state.observe(live);
        Ok(live)
    }

    /// Read and clear the alert and data ready flags.
    pub async fn read_alert_flags(&mut self) -> Tmp117Result<AlertFlags, I::Error> {
        let live =
            Configuration::from_bits(self.read_word(RegisterAddress::Configuration).await?);
        Ok(self.state.take_flags(live))
    }

    /// Whether a new result is available.
    ///
    /// Reads the configuration register unless a finished one-shot result is
    /// already known to be waiting.
    pub async fn is_conversion_ready(&mut self) -> Tmp117Result<bool, I::Error> {
        if self.state.conversion_ready() {
            return Ok(true);
        }
        let live =
            Configuration::from_bits(self.read_word(RegisterAddress::Configuration).await?);
        let flags = self.state.observe(live);
        Ok(self.state.result_available(flags))
    }

    /// Read-modify-write the configuration register.
    ///
    /// The shadow is loaded from the device on first use. Bits not touched by
    /// `f` are written back as last seen. Starting a one-shot always reads the
    /// register first, clearing a data ready flag from an earlier conversion.
    async fn modify_configuration(
        &mut self,
        f: impl FnOnce(Configuration) -> Configuration,
    ) -> Tmp117Result<Configuration, I::Error> {
        let (base, fresh) = match self.state.base() {
            Some(cfg) => (cfg, false),
            None => {
                let live = Configuration::from_bits(
                    self.read_word(RegisterAddress::Configuration).await?,
                );
                (self.state.load(live), true)
            }
        };
        let next = f(base);
        if next.mode() == ConversionMode::OneShot && !fresh {
            let live = Configuration::from_bits(
                self.read_word(RegisterAddress::Configuration).await?,
            );
            self.state.observe(live);
        }
        self.write_word(RegisterAddress::Configuration, next.into_bits()).await?;
        self.state.commit(next);
        Ok(next)
    }

    /// Select the conversion mode.
    ///
    /// Writing [`ConversionMode::OneShot`] starts one conversion, after which
    /// the device drops to shutdown by itself.
    pub async fn set_mode(&mut self, mode: ConversionMode) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_mode(mode)).await?;
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
    pub async fn set_averaging_and_cycle(
        &mut self,
        averaging: Averaging,
        cycle: ConversionCycle,
    ) -> Tmp117Result<(), I::Error> {
        validate_cycle(averaging, cycle)?;
        self.modify_configuration(|cfg| cfg.with_averaging(averaging).with_cycle(cycle))
            .await?;
        Ok(())
    }

    /// Set mode, averaging and cycle time in one write.
    pub async fn set_conversion(
        &mut self,
        mode: ConversionMode,
        averaging: Averaging,
        cycle: ConversionCycle,
    ) -> Tmp117Result<(), I::Error> {
        validate_cycle(averaging, cycle)?;
        self.modify_configuration(|cfg| {
            Configuration::from_bits(pack_configuration(mode, averaging, cycle, cfg))
        })
        .await?;
        Ok(())
    }

    /// Microseconds to wait after the last configuration write before a new
    /// result can be expected. `None` in shutdown or before the configuration
    /// is known.
    pub fn minimum_wait_us(&self) -> Option<u32> {
        self.state.shadow().and_then(|cfg| cfg.minimum_wait_us())
    }

    /// Set the thermal/alert mode.
    pub async fn set_alert_mode(&mut self, mode: AlertMode) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_alert_mode(mode)).await?;
        Ok(())
    }

    /// Set the ALERT pin polarity.
    pub async fn set_alert_polarity(
        &mut self,
        polarity: Polarity,
    ) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_polarity(polarity)).await?;
        Ok(())
    }

    /// Choose what the ALERT pin reports.
    pub async fn set_alert_pin(
        &mut self,
        select: AlertPinSelect,
    ) -> Tmp117Result<(), I::Error> {
        self.modify_configuration(|cfg| cfg.with_alert_pin(select)).await?;
        Ok(())
    }

    /// Write the high and low limits, high first.
    ///
    /// Both values are encoded before either is written. The two writes are
    /// not atomic, a comparison between them sees the new high and old low
    /// limit. A high limit below the low limit is accepted by the device and
    /// passed through.
    pub async fn set_alert_limits(
        &mut self,
        limits: AlertLimits,
    ) -> Tmp117Result<(), I::Error> {
        let high = encode_checked(limits.high)?;
        let low = encode_checked(limits.low)?;
        if limits.is_inverted() {
            log::warn!(
                "high limit {} °C is below low limit {} °C",
                limits.high,
                limits.low
            );
        }
        self.write_word(RegisterAddress::HighLimit, high).await?;
        self.write_word(RegisterAddress::LowLimit, low).await
    }

    /// Write the high limit in °C.
    pub async fn set_high_limit(&mut self, celsius: f32) -> Tmp117Result<(), I::Error> {
        let raw = encode_checked(celsius)?;
        self.write_word(RegisterAddress::HighLimit, raw).await
    }

    /// Write the low limit in °C.
    pub async fn set_low_limit(&mut self, celsius: f32) -> Tmp117Result<(), I::Error> {
        let raw = encode_checked(celsius)?;
        self.write_word(RegisterAddress::LowLimit, raw).await
    }

    /// Read both limits.
    pub async fn read_alert_limits(&mut self) -> Tmp117Result<AlertLimits, I::Error> {
        let high = decode_temperature(self.read_word(RegisterAddress::HighLimit).await?);
        let low = decode_temperature(self.read_word(RegisterAddress::LowLimit).await?);
        Ok(AlertLimits::from((high, low)))
    }

    /// Set the offset in °C that the device adds to every following result.
    pub async fn set_offset(&mut self, celsius: f32) -> Tmp117Result<(), I::Error> {
        let raw = encode_checked(celsius)?;
        self.write_word(RegisterAddress::TemperatureOffset, raw).await
    }

    /// Read the temperature offset.
    pub async fn read_offset(&mut self) -> Tmp117Result<Temperature, I::Error> {
        Ok(decode_temperature(
            self.read_word(RegisterAddress::TemperatureOffset).await?,
        ))
    }

    /// Trigger a software reset.
    ///
    /// The device reloads its registers from EEPROM, which takes about 2 ms.
    /// The configuration shadow is dropped and re-read on the next change.
    pub async fn soft_reset(&mut self) -> Tmp117Result<(), I::Error> {
        let cfg = self.state.base().unwrap_or_default().with_soft_reset(true);
        self.write_word(RegisterAddress::Configuration, cfg.into_bits()).await?;
        self.state.commit(cfg);
        Ok(())
    }

    /// The 48-bit factory identifier stored in EEPROM1, EEPROM2 and EEPROM3.
    pub async fn serial_number(&mut self) -> Tmp117Result<[u8; 6], I::Error> {
        let [a, b] = self.read_word(RegisterAddress::Eeprom1).await?.to_be_bytes();
        let [c, d] = self.read_word(RegisterAddress::Eeprom2).await?.to_be_bytes();
        let [e, f] = self.read_word(RegisterAddress::Eeprom3).await?.to_be_bytes();
        Ok([a, b, c, d, e, f])
    }

    /// Lock or unlock the EEPROM.
    ///
    /// While unlocked, register writes also program their power-on defaults.
    pub async fn set_eeprom_unlocked(
        &mut self,
        unlock: bool,
    ) -> Tmp117Result<(), I::Error> {
        let reg = EepromUnlock::new().with_unlock(unlock);
        self.write_word(RegisterAddress::EepromUnlock, reg.into_bits()).await
    }

    /// Whether EEPROM programming is in progress.
    pub async fn eeprom_busy(&mut self) -> Tmp117Result<bool, I::Error> {
        let reg = EepromUnlock::from_bits(self.read_word(RegisterAddress::EepromUnlock).await?);
        Ok(reg.busy())
    }
}

impl<I> Tmp117Async<I> {
    /// The 7-bit bus address in use.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use futures::executor::block_on;

    const ADDR: u8 = 0x48;

    fn read(reg: u8, value: u16) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, vec![reg], value.to_be_bytes().to_vec())
    }

    fn write(reg: u8, value: u16) -> I2cTransaction {
        let [msb, lsb] = value.to_be_bytes();
        I2cTransaction::write(ADDR, vec![reg, msb, lsb])
    }

    #[test]
    fn wrong_device_is_refused() {
        let mut i2c = I2cMock::new(&[read(0x0f, 0x0190)]);
        assert!(matches!(
            block_on(Tmp117Async::new(i2c.clone())),
            Err(Tmp117Error::IdentityMismatch(_))
        ));
        i2c.done();
    }

    #[test]
    fn bus_error_is_passed_through() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x00, 0x0000).with_error(ErrorKind::Other),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            assert!(matches!(
                dev.read_temperature().await,
                Err(Tmp117Error::Bus(ErrorKind::Other))
            ));
        });
        i2c.done();
    }

    #[test]
    fn oneshot_sequence() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0x0220),
            write(0x01, 0x0ca0),
            read(0x01, 0x0ca0),
            read(0x01, 0x24a0),
            read(0x00, 0x0c80),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_conversion(
                ConversionMode::OneShot,
                Averaging::X8,
                ConversionCycle::Ms125,
            )
            .await
            .unwrap();
            assert!(matches!(
                dev.read_temperature().await,
                Err(Tmp117Error::ConversionNotReady)
            ));
            assert_eq!(dev.read_temperature().await.unwrap().to_num::<f32>(), 25.0);
        });
        i2c.done();
    }

    #[test]
    fn invalid_combination_touches_nothing() {
        let mut i2c = I2cMock::new(&[read(0x0f, 0x0117)]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            assert!(matches!(
                dev.set_averaging_and_cycle(Averaging::X32, ConversionCycle::Ms250)
                    .await,
                Err(Tmp117Error::InvalidCombination)
            ));
        });
        i2c.done();
    }

    #[test]
    fn limits_and_offset() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            write(0x02, 0x0c80),
            write(0x03, 0x0500),
            write(0x07, 0x0500),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_alert_limits(AlertLimits::new(25.0, 10.0))
                .await
                .unwrap();
            assert!(matches!(
                dev.set_offset(-257.0).await,
                Err(Tmp117Error::OutOfRange)
            ));
            dev.set_offset(10.0).await.unwrap();
        });
        i2c.done();
    }

    #[test]
    fn oneshot_after_continuous_ignores_old_result() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0x0220),
            write(0x01, 0x0000),
            read(0x01, 0x2000),
            write(0x01, 0x0c00),
            read(0x01, 0x2c00),
            read(0x01, 0x2400),
            read(0x00, 0x0aaa),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_averaging_and_cycle(Averaging::X1, ConversionCycle::Ms15_5)
                .await
                .unwrap();
            dev.set_mode(ConversionMode::OneShot).await.unwrap();
            assert!(!dev.is_conversion_ready().await.unwrap());
            assert_eq!(
                dev.read_temperature().await.unwrap().to_num::<f32>(),
                21.328125
            );
        });
        i2c.done();
    }

    #[test]
    fn read_modify_write_keeps_foreign_bits() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0xa23c),
            write(0x01, 0x02fc),
            write(0x01, 0x06fc),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_averaging_and_cycle(Averaging::X64, ConversionCycle::Ms4000)
                .await
                .unwrap();
            assert_eq!(dev.minimum_wait_us(), Some(4_000_000));
            dev.set_mode(ConversionMode::Shutdown).await.unwrap();
            assert_eq!(dev.mode(), Some(ConversionMode::Shutdown));
        });
        i2c.done();
    }

    #[test]
    fn alert_flags_survive_other_reads() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0x4220),
            write(0x01, 0x0000),
            read(0x01, 0x0000),
            read(0x01, 0x0000),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_averaging_and_cycle(Averaging::X1, ConversionCycle::Ms15_5)
                .await
                .unwrap();
            let flags = dev.read_alert_flags().await.unwrap();
            assert!(flags.low_alert);
            assert!(!flags.high_alert);
            assert_eq!(dev.read_alert_flags().await.unwrap(), AlertFlags::default());
        });
        i2c.done();
    }

    #[test]
    fn therm_mode_reports_live_flags() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0x8220),
            write(0x01, 0x0230),
            read(0x01, 0x0230),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_alert_mode(AlertMode::Therm).await.unwrap();
            assert_eq!(dev.read_alert_flags().await.unwrap(), AlertFlags::default());
        });
        i2c.done();
    }

    #[test]
    fn soft_reset_forces_reread() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0x0220),
            write(0x01, 0x0620),
            write(0x01, 0x0622),
            read(0x01, 0x0220),
            write(0x01, 0x0620),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            dev.set_mode(ConversionMode::Shutdown).await.unwrap();
            dev.soft_reset().await.unwrap();
            assert_eq!(dev.mode(), None);
            dev.set_mode(ConversionMode::Shutdown).await.unwrap();
        });
        i2c.done();
    }

    #[test]
    fn failed_write_leaves_shadow() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x01, 0x0220),
            write(0x01, 0x0e20).with_error(ErrorKind::Other),
            read(0x00, 0x0c80),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            assert!(matches!(
                dev.set_mode(ConversionMode::OneShot).await,
                Err(Tmp117Error::Bus(ErrorKind::Other))
            ));
            assert_eq!(dev.mode(), Some(ConversionMode::Continuous));
            dev.read_temperature().await.unwrap();
        });
        i2c.done();
    }

    #[test]
    fn eeprom() {
        let mut i2c = I2cMock::new(&[
            read(0x0f, 0x0117),
            read(0x05, 0x1234),
            read(0x06, 0x5678),
            read(0x08, 0x9abc),
            write(0x04, 0x8000),
            read(0x04, 0xc000),
        ]);
        block_on(async {
            let mut dev = Tmp117Async::new(i2c.clone()).await.unwrap();
            assert_eq!(
                dev.serial_number().await.unwrap(),
                [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]
            );
            dev.set_eeprom_unlocked(true).await.unwrap();
            assert!(dev.eeprom_busy().await.unwrap());
        });
        i2c.done();
    }
}
