use std::io::{self, Read, Seek, SeekFrom};

use crate::byte_source::ByteSource;

/// An independent `Read + Seek` cursor over a [`ByteSource`].
///
/// Cursors are cheap; decoders that need to interleave reads at distant
/// offsets simply create one each.
pub struct SourceCursor<S> {
    source: S,
    position: u64,
}

impl<S: ByteSource> SourceCursor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<S: ByteSource> Read for SourceCursor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.source.len().saturating_sub(self.position);
        let len = (buf.len() as u64).min(remaining) as usize;

        self.source.read_exact_at(self.position, &mut buf[..len])?;
        self.position += len as u64;

        Ok(len)
    }
}

impl<S: ByteSource> Seek for SourceCursor<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // like io::Cursor, seeking past the end is allowed; reads there
        // simply return no bytes
        let new_position = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.source.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            )
        })?;

        self.position = new_position;
        Ok(new_position)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom};

    use crate::byte_source::{ByteSource, SliceSource};

    #[test]
    fn cursors_are_independent() {
        let source = SliceSource::new(*b"scimitar");

        let mut a = source.cursor();
        let mut b = source.cursor();

        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"scim");

        b.seek(SeekFrom::Start(4)).unwrap();
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"itar");

        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"itar");
    }

    #[test]
    fn read_stops_at_the_end() {
        let source = SliceSource::new([7u8; 4]);
        let mut cursor = source.cursor();
        cursor.seek(SeekFrom::Start(2)).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(cursor.read(&mut buf).unwrap(), 2);
        assert_eq!(cursor.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_from_end_and_current() {
        let source = SliceSource::new([0u8; 10]);
        let mut cursor = source.cursor();

        assert_eq!(cursor.seek(SeekFrom::End(-4)).unwrap(), 6);
        assert_eq!(cursor.seek(SeekFrom::Current(2)).unwrap(), 8);
        assert!(cursor.seek(SeekFrom::Current(-20)).is_err());
    }
}
