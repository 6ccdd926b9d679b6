//! Media type descriptions and compatibility matching.
//!
//! A [`MediaType`] describes the "shape" of a stream flowing across a pin
//! connection: a major kind (video, audio, raw byte stream), a subtype, and
//! an opaque format blob owned by the value. Wildcard kinds make a type
//! *partially specified*, which negotiation treats as "any".

use std::fmt;

/// Broad category of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MajorKind {
    /// Decoded or compressed video samples.
    Video,
    /// Decoded or compressed audio samples.
    Audio,
    /// An undifferentiated byte stream (container data before demuxing).
    Stream,
    /// Wildcard: matches any major kind during negotiation.
    Any,
}

/// Concrete layout of samples within a major kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubKind {
    /// Uncompressed video in a known pixel format.
    Pixels(PixelFormat),
    /// PCM audio.
    Pcm,
    /// MPEG program/transport data.
    Mpeg,
    /// AVI container data.
    Avi,
    /// WAVE container data.
    Wave,
    /// Wildcard: matches any subtype during negotiation.
    Any,
}

/// Pixel layouts understood by presentation surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit RGB with padding byte.
    Rgb32,
    /// 24-bit packed RGB.
    Rgb24,
    /// 16-bit RGB, 5-6-5 layout.
    Rgb565,
    /// Planar YUV 4:2:0.
    Yuv420p,
    /// Packed YUV 4:2:2.
    Uyvy,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgb32 => "rgb32",
            Self::Rgb24 => "rgb24",
            Self::Rgb565 => "rgb565",
            Self::Yuv420p => "yuv420p",
            Self::Uyvy => "uyvy",
        };
        f.write_str(name)
    }
}

/// Value type describing a stream's shape.
///
/// The format blob is owned exclusively by the value: cloning deep-copies it,
/// moving transfers it and leaves the source empty (standard move semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Broad stream category, possibly the wildcard.
    pub major: MajorKind,
    /// Sample layout within the major kind, possibly the wildcard.
    pub sub: SubKind,
    /// Opaque, owned format data (codec headers, bitmap info, ...).
    pub format: Vec<u8>,
    /// Whether every sample of the stream has the same size.
    pub fixed_size_samples: bool,
    /// Size of one sample in bytes when `fixed_size_samples` is set.
    pub sample_size: u32,
}

impl MediaType {
    /// A fully wildcarded type: matches anything, carries no format data.
    pub fn any() -> Self {
        Self {
            major: MajorKind::Any,
            sub: SubKind::Any,
            format: Vec::new(),
            fixed_size_samples: false,
            sample_size: 0,
        }
    }

    /// A raw byte-stream type with the given subtype.
    pub fn stream(sub: SubKind) -> Self {
        Self {
            major: MajorKind::Stream,
            sub,
            format: Vec::new(),
            fixed_size_samples: true,
            sample_size: 1,
        }
    }

    /// An uncompressed video type for the given pixel format.
    pub fn video(format: PixelFormat) -> Self {
        Self {
            major: MajorKind::Video,
            sub: SubKind::Pixels(format),
            format: Vec::new(),
            fixed_size_samples: true,
            sample_size: 0,
        }
    }

    /// True when the major kind or subtype is a wildcard.
    ///
    /// Partially specified types act as templates during negotiation and are
    /// never recorded as a connection's negotiated type.
    pub fn is_partially_specified(&self) -> bool {
        self.major == MajorKind::Any || self.sub == SubKind::Any
    }

    /// Compatibility predicate, wildcard-aware on `self`'s side.
    ///
    /// `self` is treated as the template: a wildcard field accepts any
    /// concrete value in `other`. Format blobs do not participate; they are
    /// interpreted by the pins that understand them.
    pub fn matches(&self, other: &MediaType) -> bool {
        let major_ok = self.major == MajorKind::Any || self.major == other.major;
        let sub_ok = self.sub == SubKind::Any || self.sub == other.sub;
        major_ok && sub_ok
    }

    /// The pixel format carried by this type, if it describes raw video.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        match (self.major, self.sub) {
            (MajorKind::Video | MajorKind::Any, SubKind::Pixels(px)) => Some(px),
            _ => None,
        }
    }
}

impl From<PixelFormat> for MediaType {
    fn from(format: PixelFormat) -> Self {
        MediaType::video(format)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.major, self.sub)
    }
}
