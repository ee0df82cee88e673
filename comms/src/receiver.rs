use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{CommsErr, LEN_TYPE_SIZE, LenType, Result, msg::Msg};

/// Frames above this size are rejected outright. Well-formed traffic tops
/// out at a few KiB since a solution is O(nrow + ncol) scalars.
const MAX_FRAME: usize = 1 << 22;

/// The receiving end handle of the communication.
pub struct MsgReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MsgReceiver<R> {
    /// Creates a new `MsgReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits to receive the next message from the inner receiver.
    ///
    /// `CommsErr::Io` means the connection is gone. `CommsErr::Malformed`
    /// covers exactly one frame; the stream stays aligned and the caller may
    /// keep receiving.
    pub async fn recv(&mut self) -> Result<Msg> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf) as usize;

        if len > MAX_FRAME {
            return Err(CommsErr::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the {MAX_FRAME} byte limit"),
            )));
        }

        self.buf.resize(len, 0);
        self.rx.read_exact(&mut self.buf).await?;

        serde_json::from_slice(&self.buf).map_err(CommsErr::Malformed)
    }
}
