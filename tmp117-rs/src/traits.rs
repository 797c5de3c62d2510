use crate::RawWord;
use embedded_hal::i2c::{I2c, SevenBitAddress};

/// Word-sized register access to a device on a shared bus.
///
/// All registers are 16 bits wide and travel most significant byte first.
/// Implemented for every blocking [`I2c`] bus.
pub trait RegisterBus {
    /// Error type of the underlying bus.
    type Error;

    /// Read one register of the device at the 7-bit `address`.
    fn read_register(&mut self, address: u8, register: u8) -> Result<RawWord, Self::Error>;

    /// Write one register of the device at the 7-bit `address`.
    fn write_register(
        &mut self,
        address: u8,
        register: u8,
        value: RawWord,
    ) -> Result<(), Self::Error>;
}

impl<I: I2c<SevenBitAddress>> RegisterBus for I {
    type Error = I::Error;

    fn read_register(&mut self, address: u8, register: u8) -> Result<RawWord, Self::Error> {
        let mut buf = [0; 2];
        self.write_read(address, &[register], &mut buf)?;
        Ok(RawWord::from_be_bytes(buf))
    }

    fn write_register(
        &mut self,
        address: u8,
        register: u8,
        value: RawWord,
    ) -> Result<(), Self::Error> {
        let [msb, lsb] = value.to_be_bytes();
        self.write(address, &[register, msb, lsb])
    }
}
