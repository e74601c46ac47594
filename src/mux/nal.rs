//! Annex B bitstream parsing for H.264 and HEVC.
//!
//! Encoders emit Annex B (start-code delimited) access units. MP4 wants
//! length-prefixed NAL units with the parameter sets moved into the sample
//! entry, so the muxer splits each unit here.

/// H.264 NAL unit type constants.
pub mod avc {
    pub const NON_IDR_SLICE: u8 = 1;
    pub const IDR_SLICE: u8 = 5;
    pub const SEI: u8 = 6;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const AUD: u8 = 9;
}

/// HEVC NAL unit type constants.
pub mod hevc {
    /// First IRAP type (BLA_W_LP).
    pub const IRAP_FIRST: u8 = 16;
    /// Last IRAP type (CRA_NUT).
    pub const IRAP_LAST: u8 = 21;
    pub const VPS: u8 = 32;
    pub const SPS: u8 = 33;
    pub const PPS: u8 = 34;
    pub const AUD: u8 = 35;
}

/// Which NAL header layout to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalSyntax {
    Avc,
    Hevc,
}

impl NalSyntax {
    /// NAL unit type from the first header byte.
    pub fn nal_type(self, header: u8) -> u8 {
        match self {
            NalSyntax::Avc => header & 0x1F,
            NalSyntax::Hevc => (header >> 1) & 0x3F,
        }
    }
}

/// A single NAL unit (without start code).
#[derive(Debug, Clone)]
pub struct NalUnit {
    pub data: Vec<u8>,
    pub nal_type: u8,
}

/// An access unit split into parameter sets and payload NAL units.
#[derive(Debug, Default)]
pub struct ParsedUnit {
    /// Non-parameter-set NAL units, in order.
    pub nals: Vec<NalUnit>,
    /// HEVC video parameter set, if present.
    pub vps: Option<Vec<u8>>,
    pub sps: Option<Vec<u8>>,
    pub pps: Option<Vec<u8>>,
    /// Whether the unit contains an IDR/IRAP picture.
    pub is_keyframe: bool,
}

impl ParsedUnit {
    /// Payload as 4-byte length-prefixed NAL units.
    pub fn to_length_prefixed(&self) -> Vec<u8> {
        let total: usize = self.nals.iter().map(|n| 4 + n.data.len()).sum();
        let mut buf = Vec::with_capacity(total);
        for nal in &self.nals {
            buf.extend_from_slice(&(nal.data.len() as u32).to_be_bytes());
            buf.extend_from_slice(&nal.data);
        }
        buf
    }
}

/// Byte ranges of the NAL units in an Annex B stream.
///
/// Handles both 3-byte (0x000001) and 4-byte (0x00000001) start codes.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (idx, &(_, payload_start)) in starts.iter().enumerate() {
        let mut end = match starts.get(idx + 1) {
            Some(&(code_start, _)) => code_start,
            None => data.len(),
        };
        // A 4-byte start code leaves its leading zero on the previous NAL.
        while end > payload_start && data[end - 1] == 0 {
            end -= 1;
        }
        if payload_start < end {
            nals.push(&data[payload_start..end]);
        }
    }
    nals
}

/// Split an Annex B access unit into parameter sets and payload.
///
/// Access unit delimiters are dropped.
pub fn parse_annex_b(data: &[u8], syntax: NalSyntax) -> ParsedUnit {
    let mut unit = ParsedUnit::default();
    for nal in split_annex_b(data) {
        let nal_type = syntax.nal_type(nal[0]);
        match (syntax, nal_type) {
            (NalSyntax::Avc, avc::SPS) | (NalSyntax::Hevc, hevc::SPS) => {
                unit.sps = Some(nal.to_vec())
            }
            (NalSyntax::Avc, avc::PPS) | (NalSyntax::Hevc, hevc::PPS) => {
                unit.pps = Some(nal.to_vec())
            }
            (NalSyntax::Hevc, hevc::VPS) => unit.vps = Some(nal.to_vec()),
            (NalSyntax::Avc, avc::AUD) | (NalSyntax::Hevc, hevc::AUD) => {}
            _ => {
                let keyframe = match syntax {
                    NalSyntax::Avc => nal_type == avc::IDR_SLICE,
                    NalSyntax::Hevc => (hevc::IRAP_FIRST..=hevc::IRAP_LAST).contains(&nal_type),
                };
                unit.is_keyframe |= keyframe;
                unit.nals.push(NalUnit {
                    data: nal.to_vec(),
                    nal_type,
                });
            }
        }
    }
    unit
}
