use crate::DeviceId;

#[derive(Debug)]
/// TMP117 driver errors
pub enum Tmp117Error<E> {
    /// Errors from the underlying bus, passed through unchanged.
    Bus(E),
    /// The device ID register did not contain the TMP117 code.
    IdentityMismatch(DeviceId),
    /// A temperature could not be represented in the 16-bit register format.
    OutOfRange,
    /// The conversion cycle is shorter than the selected averaging allows.
    InvalidCombination,
    /// A one-shot conversion was requested but has not finished yet.
    ConversionNotReady,
}

impl<E> From<E> for Tmp117Error<E> {
    fn from(value: E) -> Self {
        Self::Bus(value)
    }
}
