#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

/*! # TMP117
 *
 * A no-std driver for the Texas Instruments TMP117 ±0.1 °C digital
 * temperature sensor, on top of the `embedded-hal` 1.0 I2C traits.
 *
 * The driver maps the sparse 16-bit register file to typed operations:
 * temperature and limit registers decode to [`Temperature`] (7.8125 m°C per
 * LSB), the configuration register is a [`Configuration`] bitfield that is
 * always read-modify-written so alert pin settings and reserved bits survive,
 * and averaging/cycle combinations the device would silently stretch are
 * refused before they reach the bus.
 *
 * The driver never sleeps. Conversion timing is left to the caller, see
 * [`Tmp117::minimum_wait_us`].
 */

mod error;
mod registers;
mod sensor;
mod sensor_async;
mod state;
mod traits;
mod traits_async;

pub use error::Tmp117Error;
pub use registers::{
    AlertFlags, AlertLimits, AlertMode, AlertPinSelect, Averaging, Configuration,
    ConversionCycle, ConversionMode, DeviceId, EepromUnlock, Polarity, RESOLUTION_CELSIUS,
    RawWord, RegisterAddress, TMP117_DEVICE_ID, Temperature, TemperatureOutOfRange,
    decode_device_id, decode_temperature, encode_celsius, encode_temperature, pack_configuration,
    unpack_configuration,
};
pub use sensor::Tmp117;
pub use sensor_async::Tmp117Async;
pub use traits::RegisterBus;
pub use traits_async::RegisterBusAsync;

/// Results of TMP117-specific function calls.
pub type Tmp117Result<T, E> = Result<T, Tmp117Error<E>>;

/// Default 7-bit bus address, ADD0 tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// ADD0 pin connection, selecting the bus address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// ADD0 tied to GND (default).
    #[default]
    Gnd,
    /// ADD0 tied to V+.
    Vplus,
    /// ADD0 tied to SDA.
    Sda,
    /// ADD0 tied to SCL.
    Scl,
}

impl From<Address> for u8 {
    fn from(pin: Address) -> Self {
        match pin {
            Address::Gnd => 0x48,
            Address::Vplus => 0x49,
            Address::Sda => 0x4a,
            Address::Scl => 0x4b,
        }
    }
}

/// Builder for creating a [`Tmp117`] or [`Tmp117Async`] instance.
pub struct Tmp117Builder {
    pub(crate) addr: u8,
}

impl Default for Tmp117Builder {
    fn default() -> Self {
        Tmp117Builder {
            addr: DEFAULT_ADDRESS,
        }
    }
}

impl Tmp117Builder {
    /// Sets the bus address, either an [`Address`] or a raw 7-bit address.
    pub fn with_address(mut self, addr: impl Into<u8>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Builds a new [`Tmp117`], failing unless the device identifies as a TMP117.
    pub fn build<I: RegisterBus>(self, bus: I) -> Tmp117Result<Tmp117<I>, I::Error> {
        let mut dev = Tmp117 {
            bus,
            addr: self.addr,
            state: state::DeviceState::default(),
        };
        dev.verify_identity()?;
        Ok(dev)
    }

    /// Builds a new [`Tmp117Async`], failing unless the device identifies as a TMP117.
    pub async fn build_async<I: RegisterBusAsync>(
        self,
        bus: I,
    ) -> Tmp117Result<Tmp117Async<I>, I::Error> {
        let mut dev = Tmp117Async {
            bus,
            addr: self.addr,
            state: state::DeviceState::default(),
        };
        dev.verify_identity().await?;
        Ok(dev)
    }
}
