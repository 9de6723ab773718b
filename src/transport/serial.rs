//! Serial port transport for a directly attached PLM.

use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::Result;

/// PLMs speak 19,200 baud, 8-N-1.
pub const PLM_BAUD_RATE: u32 = 19_200;

/// Open the serial device at `path` with PLM line settings.
pub fn open(path: &str) -> Result<SerialStream> {
    let stream = tokio_serial::new(path, PLM_BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()?;
    Ok(stream)
}
