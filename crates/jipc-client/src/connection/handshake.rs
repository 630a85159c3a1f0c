//! Credential handshake performed once per transport before any message.
//!
//! ```text
//! client → server   "<user>:<password>" [capability:1] [0x00]
//! server → client   [version:1]            (or close on bad credentials)
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::ClientError;

/// Capability byte sent after the credentials.
pub const CAPABILITY: u8 = 0x09;

/// Lowest server version this client speaks.
pub const MIN_VERSION: u8 = 9;

/// Builds the handshake request.
///
/// # Errors
///
/// [`ClientError::InvalidCredentials`] if either part is not ASCII or
/// contains a NUL byte, which would end the request early.
pub fn credentials_frame(user: &str, password: &str) -> Result<Vec<u8>, ClientError> {
    for (name, part) in [("user", user), ("password", password)] {
        if !part.is_ascii() || part.contains('\0') {
            return Err(ClientError::InvalidCredentials(format!(
                "{name} must be ASCII without NUL bytes"
            )));
        }
    }

    let mut frame = Vec::with_capacity(user.len() + password.len() + 3);
    frame.extend_from_slice(user.as_bytes());
    frame.push(b':');
    frame.extend_from_slice(password.as_bytes());
    frame.push(CAPABILITY);
    frame.push(0x00);
    Ok(frame)
}

/// Sends the credentials and waits for the one-byte version reply.
///
/// Returns the version the server accepted.
///
/// # Errors
///
/// - [`ClientError::WrongCredentials`] if the server closes without replying.
/// - [`ClientError::InvalidAuthResponse`] if the reply is not a single byte.
/// - [`ClientError::UnsupportedVersion`] if the version is below [`MIN_VERSION`].
/// - [`ClientError::Transport`] for socket errors.
pub async fn authenticate<S>(stream: &mut S, user: &str, password: &str) -> Result<u8, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = credentials_frame(user, password)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;

    let mut reply = [0u8; 16];
    let n = stream.read(&mut reply).await?;
    match n {
        0 => Err(ClientError::WrongCredentials),
        1 if reply[0] >= MIN_VERSION => {
            debug!(version = reply[0], "handshake accepted");
            Ok(reply[0])
        }
        1 => Err(ClientError::UnsupportedVersion(reply[0])),
        n => Err(ClientError::InvalidAuthResponse(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_credentials_frame_layout() {
        let frame = credentials_frame("alice", "pw").unwrap();
        assert_eq!(frame, b"alice:pw\x09\x00");
    }

    #[test]
    fn test_credentials_frame_rejects_nul_and_non_ascii() {
        assert!(matches!(
            credentials_frame("a\0b", ""),
            Err(ClientError::InvalidCredentials(_))
        ));
        assert!(matches!(
            credentials_frame("user", "pässword"),
            Err(ClientError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_accepts_minimum_version() {
        // Arrange
        let mut mock = Builder::new().write(b"u:p\x09\x00").read(&[9]).build();

        // Act
        let version = authenticate(&mut mock, "u", "p").await.unwrap();

        // Assert
        assert_eq!(version, 9);
    }

    #[tokio::test]
    async fn test_authenticate_accepts_newer_version() {
        let mut mock = Builder::new().write(b"u:p\x09\x00").read(&[12]).build();
        assert_eq!(authenticate(&mut mock, "u", "p").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_old_version() {
        let mut mock = Builder::new().write(b"u:p\x09\x00").read(&[3]).build();

        let result = authenticate(&mut mock, "u", "p").await;

        assert!(matches!(result, Err(ClientError::UnsupportedVersion(3))));
    }

    #[tokio::test]
    async fn test_authenticate_close_means_wrong_credentials() {
        let mut mock = Builder::new().write(b"u:bad\x09\x00").build();

        let result = authenticate(&mut mock, "u", "bad").await;

        assert!(matches!(result, Err(ClientError::WrongCredentials)));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_multi_byte_reply() {
        let mut mock = Builder::new().write(b"u:p\x09\x00").read(&[9, 9]).build();

        let result = authenticate(&mut mock, "u", "p").await;

        assert!(matches!(result, Err(ClientError::InvalidAuthResponse(2))));
    }
}
