//! Newline-delimited framing for async byte streams.
//!
//! The wire text is percent-encoded, so a serialized message never contains
//! a newline; one line is exactly one message. This module is generic over
//! the stream type, so the same framing works over Unix domain sockets,
//! TCP sockets, or an in-memory duplex in tests.

use std::io;

use hoist_wire::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use hoist_session::{Transport, TransportRx, TransportTx};

const RECV_BUF_COMPACT_THRESHOLD: usize = 64 * 1024;

fn compact_recv_buffer(buf: &mut Vec<u8>, unread_start: &mut usize) {
    if *unread_start == buf.len() {
        buf.clear();
        *unread_start = 0;
        return;
    }

    if *unread_start >= RECV_BUF_COMPACT_THRESHOLD && *unread_start >= buf.len() / 2 {
        buf.drain(..*unread_start);
        *unread_start = 0;
    }
}

/// Take the next complete line out of the buffer, if one is there.
/// Empty lines are consumed and skipped; they are not messages.
fn take_line(buf: &mut Vec<u8>, unread_start: &mut usize) -> Option<Message> {
    loop {
        let unread = &buf[*unread_start..];
        let newline = unread.iter().position(|&b| b == b'\n')?;
        let line = &unread[..newline];
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim_end_matches('\r');
        *unread_start += newline + 1;
        if trimmed.is_empty() {
            compact_recv_buffer(buf, unread_start);
            continue;
        }
        let msg = Message::parse(trimmed);
        compact_recv_buffer(buf, unread_start);
        return Some(msg);
    }
}

/// The read side: a growing buffer scanned for complete lines.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    unread_start: usize,
}

impl<R> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            unread_start: 0,
        }
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Receive the next message. `Ok(None)` means the peer closed cleanly
    /// at a line boundary.
    pub async fn recv(&mut self) -> io::Result<Option<Message>> {
        loop {
            if let Some(msg) = take_line(&mut self.buf, &mut self.unread_start) {
                return Ok(Some(msg));
            }

            let mut tmp = [0u8; 4096];
            let n = self.inner.read(&mut tmp).await?;
            if n == 0 {
                let trailing = self.buf.len().saturating_sub(self.unread_start);
                if trailing != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("eof with {trailing} bytes of unterminated line"),
                    ));
                }
                return Ok(None);
            }
            compact_recv_buffer(&mut self.buf, &mut self.unread_start);
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }
}

/// The write side. One serialized message, one newline, one flush.
pub struct LineWriter<W> {
    inner: W,
    encode_buf: Vec<u8>,
}

impl<W> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            encode_buf: Vec::with_capacity(256),
        }
    }
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub async fn send(&mut self, msg: &Message) -> io::Result<()> {
        self.encode_buf.clear();
        self.encode_buf.extend_from_slice(msg.serialize().as_bytes());
        self.encode_buf.push(b'\n');
        self.inner.write_all(&self.encode_buf).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// A whole duplex connection, framed line by line.
///
/// Use [`send`](LineFramed::send)/[`recv`](LineFramed::recv) directly for a
/// simple request/reply loop, or split it into its two halves through the
/// session transport traits.
pub struct LineFramed<S> {
    stream: S,
    buf: Vec<u8>,
    unread_start: usize,
}

impl<S> LineFramed<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            unread_start: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineFramed<S> {
    pub async fn send(&mut self, msg: &Message) -> io::Result<()> {
        let mut line = msg.serialize().into_bytes();
        line.push(b'\n');
        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> io::Result<Option<Message>> {
        loop {
            if let Some(msg) = take_line(&mut self.buf, &mut self.unread_start) {
                return Ok(Some(msg));
            }

            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                let trailing = self.buf.len().saturating_sub(self.unread_start);
                if trailing != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("eof with {trailing} bytes of unterminated line"),
                    ));
                }
                return Ok(None);
            }
            compact_recv_buffer(&mut self.buf, &mut self.unread_start);
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportRx for LineReader<R> {
    async fn recv(&mut self) -> io::Result<Option<Message>> {
        LineReader::recv(self).await
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> TransportTx for LineWriter<W> {
    async fn send(&mut self, msg: &Message) -> io::Result<()> {
        LineWriter::send(self, msg).await
    }
}

impl<S> Transport for LineFramed<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Rx = LineReader<ReadHalf<S>>;
    type Tx = LineWriter<WriteHalf<S>>;

    fn split(self) -> (Self::Rx, Self::Tx) {
        let (read, write) = tokio::io::split(self.stream);
        let mut rx = LineReader::new(read);
        // carry over anything already buffered before the split
        rx.buf = self.buf;
        rx.unread_start = self.unread_start;
        (rx, LineWriter::new(write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_line_one_message() {
        let (client, server) = tokio::io::duplex(1024);
        let mut a = LineFramed::new(client);
        let mut b = LineFramed::new(server);

        let mut msg = Message::new("find-packages");
        msg.set("name", "z*");
        a.send(&msg).await.unwrap();

        let got = b.recv().await.unwrap().unwrap();
        assert_eq!(got.command, "find-packages");
        assert_eq!(got.get("name"), Some("z*"));
    }

    #[tokio::test]
    async fn many_messages_in_one_write_are_delivered_separately() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = client;
        writer
            .write_all(b"first?a=1\nsecond?b=2\n\nthird\n")
            .await
            .unwrap();
        drop(writer);

        let mut framed = LineFramed::new(server);
        let mut commands = Vec::new();
        while let Some(msg) = framed.recv().await.unwrap() {
            commands.push(msg.command);
        }
        // the blank line between second and third is skipped
        assert_eq!(commands, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn message_split_across_reads_is_reassembled() {
        let (mut client, server) = tokio::io::duplex(8);
        let recv = tokio::spawn(async move {
            let mut framed = LineFramed::new(server);
            framed.recv().await.unwrap().unwrap()
        });

        for chunk in [&b"install-package?na"[..], b"me=a-rather-long-name", b"\n"] {
            client.write_all(chunk).await.unwrap();
        }

        let got = recv.await.unwrap();
        assert_eq!(got.command, "install-package");
        assert_eq!(got.get("name"), Some("a-rather-long-name"));
    }

    #[tokio::test]
    async fn crlf_lines_are_tolerated() {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"task-complete?rqid=7\r\n").await.unwrap();
        drop(client);

        let mut framed = LineFramed::new(server);
        let got = framed.recv().await.unwrap().unwrap();
        assert_eq!(got.command, "task-complete");
        assert_eq!(got.get("rqid"), Some("7"));
    }

    #[tokio::test]
    async fn eof_mid_line_is_an_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"truncat").await.unwrap();
        drop(client);

        let mut framed = LineFramed::new(server);
        let err = framed.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn split_preserves_already_buffered_messages() {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"early?x=1\nlate?x=2\n").await.unwrap();

        let mut framed = LineFramed::new(server);
        let first = framed.recv().await.unwrap().unwrap();
        assert_eq!(first.command, "early");

        // "late" is sitting in the framed buffer at this point
        let (mut rx, _tx) = framed.split();
        let second = TransportRx::recv(&mut rx).await.unwrap().unwrap();
        assert_eq!(second.command, "late");
    }
}
