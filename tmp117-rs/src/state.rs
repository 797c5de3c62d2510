use crate::{
    AlertFlags, AlertMode, Averaging, Configuration, ConversionCycle, ConversionMode, RawWord,
    Tmp117Error, Tmp117Result, encode_celsius,
};

/// Encode a host-supplied Celsius value, before anything touches the bus.
pub(crate) fn encode_checked<E>(celsius: f32) -> Tmp117Result<RawWord, E> {
    encode_celsius(celsius).map_err(|_| Tmp117Error::OutOfRange)
}

/// Check the cycle time against the averaging level, before anything touches the bus.
pub(crate) fn validate_cycle<E>(
    averaging: Averaging,
    cycle: ConversionCycle,
) -> Tmp117Result<(), E> {
    if cycle.supports(averaging) {
        Ok(())
    } else {
        log::debug!("{cycle:?} is too short for {averaging:?}");
        Err(Tmp117Error::InvalidCombination)
    }
}

/// Progress of a one-shot conversion as seen by the host.
///
/// The device leaves one-shot mode on its own once the conversion is done, so
/// completion is only ever learnt from the data ready flag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OneShot {
    /// No one-shot result is outstanding.
    #[default]
    Idle,
    /// One-shot requested, data ready not seen yet.
    Pending,
    /// Data ready seen, result not read yet.
    Ready,
}

/// Host-side model of the device: the configuration shadow used for
/// read-modify-write, the one-shot tracker, and alert flags that were
/// cleared by a configuration read before anyone asked for them.
///
/// Holds no bus; the sensor types drive it around their register accesses.
#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    shadow: Option<Configuration>,
    one_shot: OneShot,
    latched: AlertFlags,
}

impl DeviceState {
    /// Base word for a read-modify-write, if the shadow is loaded.
    ///
    /// One-shot is written back as shutdown: by the time anything else is
    /// changed the device has either finished or is about to, and writing
    /// one-shot again would start another conversion.
    pub(crate) fn base(&self) -> Option<Configuration> {
        self.shadow.map(rmw_base)
    }

    /// Last known configuration, without status flags.
    pub(crate) fn shadow(&self) -> Option<Configuration> {
        self.shadow
    }

    /// Record a configuration word read from the device.
    ///
    /// Alert flags are latched when they are clear-on-read. A data ready flag
    /// completes a pending one-shot once the device has left one-shot mode;
    /// while the mode still reads back as one-shot the flag belongs to an
    /// earlier conversion. Returns the flags of this read.
    pub(crate) fn observe(&mut self, live: Configuration) -> AlertFlags {
        let flags = live.alert_flags();
        if live.alert_mode() == AlertMode::Alert {
            self.latched.high_alert |= flags.high_alert;
            self.latched.low_alert |= flags.low_alert;
        }
        if flags.data_ready
            && live.mode() != ConversionMode::OneShot
            && self.one_shot == OneShot::Pending
        {
            log::debug!("one-shot conversion complete");
            self.one_shot = OneShot::Ready;
        }
        self.shadow = Some(live.writable());
        flags
    }

    /// Load the shadow from a live read and return the read-modify-write base.
    pub(crate) fn load(&mut self, live: Configuration) -> Configuration {
        self.observe(live);
        rmw_base(live)
    }

    /// Record a configuration word that was written to the device.
    pub(crate) fn commit(&mut self, written: Configuration) {
        if written.soft_reset() {
            // registers reload from EEPROM, shadow must be re-read
            log::debug!("soft reset, configuration shadow dropped");
            *self = Self::default();
            return;
        }
        if written.alert_mode() == AlertMode::Therm {
            self.latched = AlertFlags::default();
        }
        self.one_shot = match written.mode() {
            ConversionMode::OneShot => OneShot::Pending,
            _ => OneShot::Idle,
        };
        self.shadow = Some(written.writable());
    }

    /// Whether a temperature read has to check data ready first.
    pub(crate) fn awaiting_conversion(&self) -> bool {
        self.one_shot == OneShot::Pending
    }

    /// A one-shot result is waiting to be read.
    pub(crate) fn conversion_ready(&self) -> bool {
        self.one_shot == OneShot::Ready
    }

    /// Record that the temperature register was read.
    pub(crate) fn result_consumed(&mut self) {
        if self.one_shot == OneShot::Ready {
            self.one_shot = OneShot::Idle;
        }
    }

    /// Whether a configuration read with these flags means a new result.
    ///
    /// While a one-shot is pending only its own completion counts.
    pub(crate) fn result_available(&self, flags: AlertFlags) -> bool {
        self.conversion_ready() || (!self.awaiting_conversion() && flags.data_ready)
    }

    /// Flags of a live read combined with everything latched so far.
    /// Clears the latch. In therm mode the live flags are reported as is.
    pub(crate) fn take_flags(&mut self, live: Configuration) -> AlertFlags {
        let seen = self.observe(live);
        let latched = core::mem::take(&mut self.latched);
        let flags = match live.alert_mode() {
            AlertMode::Alert => seen.merge(latched),
            AlertMode::Therm => seen,
        };
        AlertFlags {
            data_ready: self.result_available(flags),
            ..flags
        }
    }
}

fn rmw_base(cfg: Configuration) -> Configuration {
    let cfg = cfg.writable();
    if cfg.mode() == ConversionMode::OneShot {
        cfg.with_mode(ConversionMode::Shutdown)
    } else {
        cfg
    }
}
