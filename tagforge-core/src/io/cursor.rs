// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A single seekable read+write cursor. Codecs are handed one `Cursor` for an entire read or
//! write call; none of them hold separate reader and writer handles onto the same file (see
//! DESIGN.md: "cyclic writer/reader passing").

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::errors::Result;
use crate::io::{ReadBytes, WriteBytes};

/// Anything `Cursor` can drive: a file, or (for tests) an in-memory byte buffer.
pub trait SeekableStream: Read + Write + Seek {
    fn stream_len(&mut self) -> std::io::Result<u64>;

    fn set_stream_len(&mut self, len: u64) -> std::io::Result<()>;
}

impl Read for Box<dyn SeekableStream> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read(buf)
    }
}

impl Write for Box<dyn SeekableStream> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (**self).flush()
    }
}

impl Seek for Box<dyn SeekableStream> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        (**self).seek(pos)
    }
}

impl SeekableStream for Box<dyn SeekableStream> {
    fn stream_len(&mut self) -> std::io::Result<u64> {
        (**self).stream_len()
    }

    fn set_stream_len(&mut self, len: u64) -> std::io::Result<()> {
        (**self).set_stream_len(len)
    }
}

/// A dynamically dispatched stream, used by the facade and by `MetaDataIo` so codecs don't need
/// to be generic over the concrete stream type.
pub type DynStream = Cursor<Box<dyn SeekableStream>>;

impl SeekableStream for File {
    fn stream_len(&mut self) -> std::io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(len)
    }

    fn set_stream_len(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// An in-memory stand-in for a file, used heavily by unit and integration tests so that fixtures
/// never need to touch the filesystem.
#[derive(Default, Debug, Clone)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: u64,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryStream { data, pos: 0 }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn get_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let start = self.pos as usize;
        let n = buf.len().min(self.data.len().saturating_sub(start));
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let start = self.pos as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.data.len() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before byte 0",
            ));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl SeekableStream for MemoryStream {
    fn stream_len(&mut self) -> std::io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_stream_len(&mut self, len: u64) -> std::io::Result<()> {
        self.data.resize(len as usize, 0);
        if self.pos > len {
            self.pos = len;
        }
        Ok(())
    }
}

/// A seekable cursor over a [`SeekableStream`], implementing [`ReadBytes`] and [`WriteBytes`].
pub struct Cursor<S: SeekableStream> {
    inner: S,
}

impl<S: SeekableStream> Cursor<S> {
    pub fn new(inner: S) -> Self {
        Cursor { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn pos(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn len(&mut self) -> Result<u64> {
        Ok(self.inner.stream_len()?)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        Ok(self.inner.seek(from)?)
    }

    pub fn set_len(&mut self, len: u64) -> Result<()> {
        Ok(self.inner.set_stream_len(len)?)
    }
}

impl<S: SeekableStream> ReadBytes for Cursor<S> {
    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }
}

impl<S: SeekableStream> WriteBytes for Cursor<S> {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.inner.write_all(&[b])?;
        Ok(())
    }

    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_round_trips() {
        let mut cur = Cursor::new(MemoryStream::new(vec![1, 2, 3, 4]));
        assert_eq!(cur.read_u16_be().unwrap(), 0x0102);
        cur.seek(SeekFrom::Start(0)).unwrap();
        cur.write_u16_be(0xaabb).unwrap();
        let data = cur.into_inner().into_inner();
        assert_eq!(&data[..2], &[0xaa, 0xbb]);
    }
}
