//! The implementation of the sending end of the application layer protocol.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{CommsErr, LEN_TYPE_SIZE, LenType, Result, msg::Msg};

/// The sending end handle of the communication.
pub struct MsgSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> MsgSender<W> {
    /// Creates a new `MsgSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` through the inner sender as one length-prefixed frame.
    ///
    /// # Arguments
    /// * `msg` - The message to encode and send.
    ///
    /// # Returns
    /// A result object that returns `CommsErr` on failure.
    pub async fn send(&mut self, msg: &Msg) -> Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        buf.resize(LEN_TYPE_SIZE, 0);

        serde_json::to_writer(&mut *buf, msg).map_err(CommsErr::Malformed)?;
        let len = (buf.len() - LEN_TYPE_SIZE) as LenType;
        buf[..LEN_TYPE_SIZE].copy_from_slice(&len.to_be_bytes());

        tx.write_all(buf).await?;
        tx.flush().await?;
        Ok(())
    }
}
