//! Bus receive loop: framing, addressing and replies.
//!
//! The driver owns the bus. Every read except the first byte of a frame is
//! bounded by a timeout, and any timeout restarts the transceiver so that
//! partial bytes never desynchronise the next frame.

use core::marker::PhantomData;

use embassy_time::Duration;

use crate::address::{Address, Diagnostic};
use crate::checksum::{Checksum, Crc16, footer_value};
use crate::error::{Error, ErrorCode, Result};
use crate::protocol::{
    HEADER_LEN, Header, MAX_REPLY_FRAME, MessageType, encode_frame, error_payload,
};
use crate::service::Service;
use crate::shared_constants::MAX_PAYLOAD;

/// Half-duplex byte transport shared by every board on the bus.
#[expect(
    async_fn_in_trait,
    reason = "implementations are used from a single executor, Send is not needed"
)]
pub trait Bus {
    /// Fill `buf` completely, or fail with [`Error::Timeout`] once `timeout`
    /// elapses. `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] or [`Error::Bus`].
    async fn read_exact(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<()>;

    /// Transmit `bytes`, holding the bus only for the duration of the write.
    ///
    /// # Errors
    ///
    /// [`Error::Bus`] if the transceiver fails.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush anything buffered and bring the transceiver back to idle.
    async fn restart(&mut self);
}

/// Bus timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommConfig {
    pub baud_rate: u32,
    /// Limit for the rest of a header once its first byte arrives.
    pub header_timeout: Duration,
    pub footer_timeout: Duration,
    /// Added to the wire time of every payload read.
    pub payload_slack: Duration,
}

impl CommConfig {
    /// Worst-case time to receive `len` bytes at 10 bits per byte, plus slack.
    #[must_use]
    pub fn payload_timeout(&self, len: usize) -> Duration {
        let bits = u64::try_from(len).unwrap_or(u64::MAX).saturating_mul(10);
        let micros = bits.saturating_mul(1_000_000) / u64::from(self.baud_rate.max(1));
        Duration::from_micros(micros) + self.payload_slack
    }
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            header_timeout: Duration::from_millis(2),
            footer_timeout: Duration::from_millis(2),
            payload_slack: Duration::from_millis(5),
        }
    }
}

/// What happened to one received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// A raw diagnostic for this board was answered.
    Diagnostic(Diagnostic),
    /// A raw diagnostic for another board was consumed.
    OtherDiagnostic,
    /// A frame for another board was drained.
    NotAddressed,
    /// A request was serviced and answered with this reply type.
    Replied(MessageType),
    /// A request failed and an error frame with this code was sent.
    Rejected(ErrorCode),
    /// The frame was discarded without a reply.
    Dropped(Error),
}

/// Receives frames for one board and dispatches them to its [`Service`].
pub struct CommDriver<'a, B, C = Crc16> {
    bus: B,
    address: Address,
    service: Service<'a>,
    config: CommConfig,
    payload: [u8; MAX_PAYLOAD],
    checksum: PhantomData<C>,
}

impl<'a, B: Bus, C: Checksum> CommDriver<'a, B, C> {
    #[must_use]
    pub const fn new(bus: B, address: Address, service: Service<'a>, config: CommConfig) -> Self {
        Self {
            bus,
            address,
            service,
            config,
            payload: [0; MAX_PAYLOAD],
            checksum: PhantomData,
        }
    }

    #[must_use]
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Receive and handle frames forever.
    pub async fn run(&mut self) -> ! {
        info!("comm driver listening as {:?}", self.address.board());
        loop {
            let outcome = self.poll().await;
            debug!("frame outcome: {:?}", outcome);
        }
    }

    /// Wait for the next frame (or diagnostic byte) and handle it.
    pub async fn poll(&mut self) -> Outcome {
        let mut first = [0_u8; 1];
        if let Err(err) = self.bus.read_exact(&mut first, None).await {
            return self.drop_frame(err).await;
        }
        let [first] = first;

        if let Some(diagnostic) = Diagnostic::decode(first) {
            return self.diagnostic(diagnostic).await;
        }

        let mut rest = [0_u8; HEADER_LEN - 1];
        if let Err(err) = self
            .bus
            .read_exact(&mut rest, Some(self.config.header_timeout))
            .await
        {
            return self.drop_frame(err).await;
        }
        let [b1, b2, b3] = rest;
        let header = Header::from_bytes([first, b1, b2, b3]);
        let size = header.payload_len();

        if !self.address.is_self(header.address) {
            return match self.drain(size.saturating_add(C::WIDTH)).await {
                Ok(()) => Outcome::NotAddressed,
                Err(err) => self.drop_frame(err).await,
            };
        }

        if size > MAX_PAYLOAD {
            if let Err(err) = self.drain(size.saturating_add(C::WIDTH)).await {
                return self.drop_frame(err).await;
            }
            warn!("frame payload of {} bytes exceeds {}", size, MAX_PAYLOAD);
            return self.reject(Error::PayloadTooLarge(header.size)).await;
        }

        let timeout = self.config.payload_timeout(size);
        let Some(payload) = self.payload.get_mut(..size) else {
            return self.drop_frame(Error::PayloadTooLarge(header.size)).await;
        };
        if let Err(err) = self.bus.read_exact(payload, Some(timeout)).await {
            return self.drop_frame(err).await;
        }

        let mut footer = [0_u8; 4];
        let Some(footer) = footer.get_mut(..C::WIDTH) else {
            return self.drop_frame(Error::ChecksumMismatch).await;
        };
        if let Err(err) = self
            .bus
            .read_exact(footer, Some(self.config.footer_timeout))
            .await
        {
            return self.drop_frame(err).await;
        }

        let mut checksum = C::default();
        checksum.update_many(&header.to_bytes());
        checksum.update_many(self.payload.get(..size).unwrap_or_default());
        if checksum.value() != footer_value(footer) {
            warn!("checksum mismatch, frame dropped");
            return Outcome::Dropped(Error::ChecksumMismatch);
        }

        let request = self.payload.get(..size).unwrap_or_default();
        match self.service.handle(header.message_type, request) {
            Ok(response) => {
                match self.send_frame(response.kind, &response.payload).await {
                    Ok(()) => Outcome::Replied(response.kind),
                    Err(err) => self.drop_frame(err).await,
                }
            }
            Err(err) => self.reject(err).await,
        }
    }

    async fn diagnostic(&mut self, diagnostic: Diagnostic) -> Outcome {
        if !self.address.owns(diagnostic) {
            return Outcome::OtherDiagnostic;
        }
        let reply = self.service.diagnostic(diagnostic.kind);
        match self.bus.write_all(&reply).await {
            Ok(()) => Outcome::Diagnostic(diagnostic),
            Err(err) => self.drop_frame(err).await,
        }
    }

    /// Report a capacity or command error; framing errors are only dropped.
    async fn reject(&mut self, err: Error) -> Outcome {
        let Some(code) = err.code() else {
            return self.drop_frame(err).await;
        };
        warn!("request rejected: {:?}", err);
        match self.send_frame(MessageType::Error, &error_payload(code)).await {
            Ok(()) => Outcome::Rejected(code),
            Err(err) => self.drop_frame(err).await,
        }
    }

    async fn send_frame(&mut self, kind: MessageType, payload: &[u8]) -> Result<()> {
        let frame = encode_frame::<C, MAX_REPLY_FRAME>(self.address.code(), kind, payload)?;
        self.bus.write_all(&frame).await
    }

    /// Consume `len` bytes that belong to a frame we will not service.
    async fn drain(&mut self, mut len: usize) -> Result<()> {
        while len > 0 {
            let chunk = len.min(self.payload.len());
            let timeout = self.config.payload_timeout(chunk);
            let buf = self.payload.get_mut(..chunk).ok_or(Error::Bus)?;
            self.bus.read_exact(buf, Some(timeout)).await?;
            len = len.saturating_sub(chunk);
        }
        Ok(())
    }

    async fn drop_frame(&mut self, err: Error) -> Outcome {
        warn!("frame dropped: {:?}", err);
        if matches!(err, Error::Timeout | Error::Bus) {
            self.bus.restart().await;
        }
        Outcome::Dropped(err)
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn payload_timeout_scales_with_length() {
        let config = CommConfig::default();
        assert_eq!(config.payload_timeout(0), Duration::from_millis(5));
        // 1152 bytes at 115200 baud is exactly 100 ms on the wire.
        assert_eq!(
            config.payload_timeout(1152),
            Duration::from_millis(105)
        );
    }

    #[test]
    fn zero_baud_does_not_divide_by_zero() {
        let config = CommConfig {
            baud_rate: 0,
            ..CommConfig::default()
        };
        assert!(config.payload_timeout(4) > config.payload_slack);
    }
}
