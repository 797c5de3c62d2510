#![allow(async_fn_in_trait)]
use crate::RawWord;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

/// Word-sized register access to a device on a shared bus, asynchronously.
///
/// Same wire format as [`RegisterBus`](crate::RegisterBus). Implemented for
/// every async [`I2c`] bus.
pub trait RegisterBusAsync {
    /// Error type of the underlying bus.
    type Error;

    /// Read one register of the device at the 7-bit `address`.
    async fn read_register(&mut self, address: u8, register: u8) -> Result<RawWord, Self::Error>;

    /// Write one register of the device at the 7-bit `address`.
    async fn write_register(
        &mut self,
        address: u8,
        register: u8,
        value: RawWord,
    ) -> Result<(), Self::Error>;
}

impl<I: I2c<SevenBitAddress>> RegisterBusAsync for I {
    type Error = I::Error;

    async fn read_register(&mut self, address: u8, register: u8) -> Result<RawWord, Self::Error> {
        let mut buf = [0; 2];
        self.write_read(address, &[register], &mut buf).await?;
        Ok(RawWord::from_be_bytes(buf))
    }

    async fn write_register(
        &mut self,
        address: u8,
        register: u8,
        value: RawWord,
    ) -> Result<(), Self::Error> {
        let [msb, lsb] = value.to_be_bytes();
        self.write(address, &[register, msb, lsb]).await
    }
}
