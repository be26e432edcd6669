//! File server client.
//!
//! Connecting runs the trust-on-first-use step before the handshake: the
//! server offers its public key in the clear, the [`TrustStore`] decides
//! which key to seal the session to, and the server is told whether its key
//! was accepted.

use std::{io, path::Path};

use sharevault_core::{
    Environment, Prompter, Session, TrustError, TrustStore, answer_key_offer, receive_key_offer,
};
use sharevault_proto::{
    Endpoint, Message, ResponseTag, Token,
    messages::{CHUNK_SIZE, Chunk, FileRequest, Upload},
};
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::{ClientError, unexpected};

/// Connection to a file server.
pub struct FileClient<E: Environment> {
    session: Session<TcpStream, E>,
    endpoint: Endpoint,
}

impl<E: Environment> FileClient<E> {
    /// Connect to `endpoint`, pin or check its key, and run the handshake.
    ///
    /// The endpoint is also the trust identity and the value tokens for this
    /// server must be bound to, so pass it exactly as the user gave it.
    ///
    /// # Errors
    ///
    /// - `Trust` if the operator declines an unknown key (the server is told
    ///   with `FAIL_KEY`)
    /// - `Channel` if the key offer or handshake fails
    /// - `Io` if the TCP connection fails
    pub async fn connect<P: Prompter + ?Sized>(
        endpoint: Endpoint,
        env: E,
        trust: &mut TrustStore,
        prompter: &mut P,
    ) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect((endpoint.ip.as_str(), endpoint.port)).await?;
        let offered = receive_key_offer(&mut stream).await?;

        let server_key = match trust.verify(&endpoint.to_string(), &offered, prompter) {
            Ok(key) => key,
            Err(e) => {
                if matches!(e, TrustError::Rejected { .. }) {
                    answer_key_offer(&mut stream, false).await?;
                }
                return Err(e.into());
            },
        };
        answer_key_offer(&mut stream, true).await?;

        let session = Session::connect(stream, env, server_key).await?;
        tracing::debug!(server = %endpoint, "connected to file server");
        Ok(Self { session, endpoint })
    }

    /// Endpoint this client is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Paths readable with `token`.
    pub async fn list_files(&mut self, token: &Token) -> Result<Vec<String>, ClientError> {
        match self.session.request(Message::ListFiles { token: token.clone() }).await? {
            Message::FileList(paths) => Ok(paths),
            Message::Status(tag) => Err(ClientError::Refused(tag)),
            other => Err(unexpected(&other)),
        }
    }

    /// Upload everything `source` yields as `path`, shared with `group`.
    ///
    /// Returns the number of bytes sent.
    pub async fn upload<R: AsyncRead + Unpin>(
        &mut self,
        token: &Token,
        path: &str,
        group: &str,
        mut source: R,
    ) -> Result<u64, ClientError> {
        let request = Message::Upload(Upload {
            path: path.to_string(),
            group: group.to_string(),
            token: token.clone(),
        });
        expect_status_or(self.session.request(request).await?, &Message::Ready)?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = match read_full(&mut source, &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    // Any tag other than CHUNK/EOF makes the server drop the
                    // partial file
                    let abort = Message::Status(ResponseTag::ErrorTransfer);
                    if let Err(abort) = self.session.request(abort).await {
                        tracing::debug!(error = %abort, "could not abort upload");
                    }
                    return Err(e.into());
                },
            };
            if n == 0 {
                break;
            }
            let chunk = Message::Chunk(Chunk { data: buf[..n].to_vec() });
            expect_status_or(self.session.request(chunk).await?, &Message::Ready)?;
            sent += n as u64;
        }

        expect_status_or(self.session.request(Message::Eof).await?, &Message::Ok)?;
        tracing::info!(path, group, bytes = sent, "upload complete");
        Ok(sent)
    }

    /// Upload the local file at `local`.
    pub async fn upload_file(
        &mut self,
        token: &Token,
        local: &Path,
        path: &str,
        group: &str,
    ) -> Result<u64, ClientError> {
        let file = fs::File::open(local).await?;
        self.upload(token, path, group, file).await
    }

    /// Download `path` into `sink`. Returns the number of bytes received.
    pub async fn download<W: AsyncWrite + Unpin>(
        &mut self,
        token: &Token,
        path: &str,
        mut sink: W,
    ) -> Result<u64, ClientError> {
        let request =
            Message::Download(FileRequest { path: path.to_string(), token: token.clone() });
        let mut reply = self.session.request(request).await?;
        let mut received = 0u64;

        loop {
            match reply {
                Message::Chunk(Chunk { data }) => {
                    sink.write_all(&data).await?;
                    received += data.len() as u64;
                    reply = self.session.request(Message::NextChunk).await?;
                },
                Message::Eof => break,
                Message::Status(tag) => return Err(ClientError::Refused(tag)),
                other => return Err(unexpected(&other)),
            }
        }

        self.session.send(Message::Ok).await?;
        sink.flush().await?;
        tracing::info!(path, bytes = received, "download complete");
        Ok(received)
    }

    /// Download `path` into a new local file at `local`.
    ///
    /// Refuses to overwrite an existing file. A failed download leaves no
    /// partial file behind.
    pub async fn download_file(
        &mut self,
        token: &Token,
        path: &str,
        local: &Path,
    ) -> Result<u64, ClientError> {
        let file = fs::OpenOptions::new().write(true).create_new(true).open(local).await?;
        match self.download(token, path, file).await {
            Ok(n) => Ok(n),
            Err(e) => {
                if let Err(remove) = fs::remove_file(local).await {
                    tracing::debug!(error = %remove, "could not remove partial download");
                }
                Err(e)
            },
        }
    }

    /// Delete `path`.
    pub async fn delete(&mut self, token: &Token, path: &str) -> Result<(), ClientError> {
        let request =
            Message::DeleteFile(FileRequest { path: path.to_string(), token: token.clone() });
        let reply = self.session.request(request).await?;
        expect_status_or(reply, &Message::Ok)
    }

    /// Send `DISCONNECT` and close the connection.
    pub async fn disconnect(self) -> Result<(), ClientError> {
        Ok(self.session.disconnect().await?)
    }
}

/// Accept `expected`, map a status to `Refused`, anything else to
/// `UnexpectedReply`.
fn expect_status_or(reply: Message, expected: &Message) -> Result<(), ClientError> {
    if &reply == expected {
        return Ok(());
    }
    match reply {
        Message::Status(tag) => Err(ClientError::Refused(tag)),
        other => Err(unexpected(&other)),
    }
}

/// Fill `buf` as far as the reader allows. Short only at end of input.
async fn read_full<R: AsyncRead + Unpin>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
