//! Byte-range arithmetic and header parsing for ranged HTTP requests.

/// A contiguous byte range of a remote resource.
///
/// `length = None` means "from `offset` to the end of the content".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Absolute offset of the first byte.
    pub offset: u64,
    /// Number of bytes covered, or `None` for an open-ended range.
    pub length: Option<u64>,
}

impl ByteRange {
    /// Create a bounded range covering `length` bytes from `offset`.
    ///
    /// `length` must be greater than zero; a range cannot cover nothing.
    pub fn new(offset: u64, length: u64) -> Self {
        assert!(length > 0, "range length must be positive");
        Self {
            offset,
            length: Some(length),
        }
    }

    /// Create an open-ended range from `offset` to the end of the content.
    pub fn from_offset(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    /// Exclusive end offset, when the range is bounded.
    pub fn end(&self) -> Option<u64> {
        self.length.map(|length| self.offset + length)
    }

    /// Render the `Range` request header value: `bytes=A-B` with an
    /// inclusive last byte, or `bytes=A-` for an open-ended range.
    pub fn header_value(&self) -> String {
        match self.length {
            Some(length) => format!("bytes={}-{}", self.offset, self.offset + length - 1),
            None => format!("bytes={}-", self.offset),
        }
    }

    /// The range left over after the first `emitted` bytes of this range
    /// have been consumed. `emitted` must not reach the end of a bounded
    /// range; an exhausted range has no remainder.
    pub fn advance(&self, emitted: u64) -> ByteRange {
        debug_assert!(
            self.length.map_or(true, |length| emitted < length),
            "cannot advance past the end of the range"
        );
        ByteRange {
            offset: self.offset + emitted,
            length: self.length.map(|length| length.saturating_sub(emitted)),
        }
    }
}

/// Extract the total content length from a `Content-Range` header value.
///
/// The header has the shape `bytes <start>-<end>/<total>`; the total is
/// whatever follows the `/`. Returns `None` when there is no `/` or the
/// total is not a number (servers send `*` for an unknown total).
pub fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.split_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_header_value_uses_inclusive_end() {
        assert_eq!(ByteRange::new(0, 10).header_value(), "bytes=0-9");
        assert_eq!(ByteRange::new(4096, 1024).header_value(), "bytes=4096-5119");
    }

    #[test]
    fn test_open_ended_header_value() {
        assert_eq!(ByteRange::from_offset(0).header_value(), "bytes=0-");
        assert_eq!(ByteRange::from_offset(512).header_value(), "bytes=512-");
    }

    #[test]
    fn test_end_is_exclusive() {
        assert_eq!(ByteRange::new(4, 6).end(), Some(10));
        assert_eq!(ByteRange::from_offset(4).end(), None);
    }

    #[test]
    fn test_advance_shrinks_bounded_range() {
        let range = ByteRange::new(100, 400);
        let resumed = range.advance(150);
        assert_eq!(resumed.offset, 250);
        assert_eq!(resumed.length, Some(250));
    }

    #[test]
    fn test_advance_keeps_open_ended_range_open() {
        let resumed = ByteRange::from_offset(10).advance(5);
        assert_eq!(resumed.offset, 15);
        assert_eq!(resumed.length, None);
    }

    #[test]
    #[should_panic]
    fn test_zero_length_range_is_rejected() {
        ByteRange::new(0, 0);
    }

    #[test]
    fn test_content_range_total_parses_trailing_total() {
        assert_eq!(content_range_total("bytes 0-499/1234"), Some(1234));
        assert_eq!(content_range_total("bytes 0-0/1"), Some(1));
        assert_eq!(content_range_total("bytes */0"), Some(0));
    }

    #[test]
    fn test_content_range_total_rejects_unknown_total() {
        assert_eq!(content_range_total("bytes 0-499/*"), None);
        assert_eq!(content_range_total("bytes 0-499"), None);
        assert_eq!(content_range_total("garbage"), None);
    }
}
