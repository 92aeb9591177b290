//! Bounded structural parsing of video containers.
//!
//! Only the headers needed for the duration are read: box/element/chunk
//! headers are skipped by seeking, so a multi-gigabyte file costs a handful of
//! small reads. Malformed or truncated structures yield `None`.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;

/// Upper bound on headers visited per nesting level.
const MAX_VISITED: usize = 256;

/// Video container layouts the probe can read a duration from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// ISO base media (mp4, mov, m4v, 3gp).
    IsoBmff,
    /// Matroska and WebM.
    Matroska,
    /// RIFF AVI.
    Avi,
}

impl Container {
    /// Maps a detected MIME type to its container layout.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "video/mp4" | "video/quicktime" | "video/x-m4v" | "video/3gpp" => Some(Self::IsoBmff),
            "video/x-matroska" | "video/webm" => Some(Self::Matroska),
            "video/x-msvideo" => Some(Self::Avi),
            _ => None,
        }
    }
}

/// Reads the playback duration of a container, if it can be determined.
pub fn read_duration<R: Read + Seek>(reader: &mut R, container: Container) -> Option<Duration> {
    let parsed = match container {
        Container::IsoBmff => iso_bmff_duration(reader),
        Container::Matroska => matroska_duration(reader),
        Container::Avi => avi_duration(reader),
    };
    parsed.ok().flatten()
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Converts header seconds, rejecting NaN, negative and out-of-range values.
fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

// ---------------------------------------------------------------------------
// ISO base media file format
// ---------------------------------------------------------------------------

fn iso_bmff_duration<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Duration>> {
    let len = reader.seek(SeekFrom::End(0))?;
    let Some((moov_start, moov_end)) = find_box(reader, 0, len, b"moov")? else {
        return Ok(None);
    };
    let Some((mvhd_start, mvhd_end)) = find_box(reader, moov_start, moov_end, b"mvhd")? else {
        return Ok(None);
    };

    reader.seek(SeekFrom::Start(mvhd_start))?;
    let [version, _, _, _] = read_array::<_, 4>(reader)?;
    let (timescale, duration) = match version {
        0 if mvhd_end - mvhd_start >= 20 => {
            reader.seek(SeekFrom::Current(8))?;
            let timescale = u32::from_be_bytes(read_array(reader)?);
            let duration = u32::from_be_bytes(read_array(reader)?);
            if duration == u32::MAX {
                return Ok(None);
            }
            (timescale, u64::from(duration))
        }
        1 if mvhd_end - mvhd_start >= 32 => {
            reader.seek(SeekFrom::Current(16))?;
            let timescale = u32::from_be_bytes(read_array(reader)?);
            let duration = u64::from_be_bytes(read_array(reader)?);
            if duration == u64::MAX {
                return Ok(None);
            }
            (timescale, duration)
        }
        _ => return Ok(None),
    };

    if timescale == 0 {
        return Ok(None);
    }
    Ok(seconds(duration as f64 / f64::from(timescale)))
}

/// Finds the first box of type `fourcc` among the boxes in `[start, end)`
/// and returns the byte range of its body.
fn find_box<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    fourcc: &[u8; 4],
) -> io::Result<Option<(u64, u64)>> {
    let mut pos = start;
    for _ in 0..MAX_VISITED {
        if pos.saturating_add(8) > end {
            return Ok(None);
        }
        reader.seek(SeekFrom::Start(pos))?;
        let size = u32::from_be_bytes(read_array(reader)?);
        let kind: [u8; 4] = read_array(reader)?;

        let (size, header_len) = match size {
            0 => (end - pos, 8),
            1 => (u64::from_be_bytes(read_array(reader)?), 16),
            n => (u64::from(n), 8),
        };
        if size < header_len || pos.saturating_add(size) > end {
            return Ok(None);
        }
        if &kind == fourcc {
            return Ok(Some((pos + header_len, pos + size)));
        }
        pos += size;
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Matroska / WebM (EBML)
// ---------------------------------------------------------------------------

const EBML_HEADER: u32 = 0x1A45_DFA3;
const SEGMENT: u32 = 0x1853_8067;
const SEGMENT_INFO: u32 = 0x1549_A966;
const CLUSTER: u32 = 0x1F43_B675;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

struct ElementHeader {
    id: u32,
    /// `None` for elements of unknown size.
    size: Option<u64>,
}

/// Reads an EBML variable-length integer. Returns the raw value (marker
/// bit kept when `keep_marker`) and the encoded length.
fn read_vint<R: Read>(reader: &mut R, max_len: u32, keep_marker: bool) -> io::Result<(u64, u32)> {
    let [first] = read_array::<_, 1>(reader)?;
    let len = first.leading_zeros() + 1;
    if len > max_len {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid EBML length"));
    }
    let mut value = if keep_marker {
        u64::from(first)
    } else {
        u64::from(first) & ((1u64 << (8 - len)) - 1)
    };
    for _ in 1..len {
        let [byte] = read_array::<_, 1>(reader)?;
        value = (value << 8) | u64::from(byte);
    }
    Ok((value, len))
}

fn read_element_header<R: Read>(reader: &mut R) -> io::Result<(ElementHeader, u64)> {
    let (id, id_len) = read_vint(reader, 4, true)?;
    let (size, size_len) = read_vint(reader, 8, false)?;
    let unknown = size == (1u64 << (7 * size_len)) - 1;
    let header = ElementHeader {
        id: id as u32,
        size: (!unknown).then_some(size),
    };
    Ok((header, u64::from(id_len + size_len)))
}

fn read_uint<R: Read>(reader: &mut R, size: u64) -> io::Result<u64> {
    if size > 8 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "integer too wide"));
    }
    let mut value = 0u64;
    for _ in 0..size {
        let [byte] = read_array::<_, 1>(reader)?;
        value = (value << 8) | u64::from(byte);
    }
    Ok(value)
}

fn read_float<R: Read>(reader: &mut R, size: u64) -> io::Result<Option<f64>> {
    match size {
        4 => Ok(Some(f64::from(f32::from_be_bytes(read_array(reader)?)))),
        8 => Ok(Some(f64::from_be_bytes(read_array(reader)?))),
        _ => Ok(None),
    }
}

fn matroska_duration<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Duration>> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let (header, header_len) = read_element_header(reader)?;
    let Some(ebml_size) = header.size.filter(|_| header.id == EBML_HEADER) else {
        return Ok(None);
    };
    let segment_pos = header_len + ebml_size;
    if segment_pos >= len {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(segment_pos))?;
    let (segment, segment_header_len) = read_element_header(reader)?;
    if segment.id != SEGMENT {
        return Ok(None);
    }
    let children_start = segment_pos + segment_header_len;
    let children_end = segment
        .size
        .map_or(len, |size| children_start.saturating_add(size).min(len));

    let mut pos = children_start;
    for _ in 0..MAX_VISITED {
        if pos >= children_end {
            return Ok(None);
        }
        reader.seek(SeekFrom::Start(pos))?;
        let (child, child_header_len) = read_element_header(reader)?;
        if child.id == CLUSTER {
            // Media data starts here; Info always precedes it.
            return Ok(None);
        }
        let Some(size) = child.size else {
            return Ok(None);
        };
        let body = pos + child_header_len;
        if child.id == SEGMENT_INFO {
            return segment_info_duration(reader, body, body.saturating_add(size).min(children_end));
        }
        pos = body.saturating_add(size);
    }
    Ok(None)
}

fn segment_info_duration<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
) -> io::Result<Option<Duration>> {
    let mut scale = DEFAULT_TIMECODE_SCALE;
    let mut duration = None;

    let mut pos = start;
    for _ in 0..MAX_VISITED {
        if pos >= end {
            break;
        }
        reader.seek(SeekFrom::Start(pos))?;
        let (child, header_len) = read_element_header(reader)?;
        let Some(size) = child.size else {
            break;
        };
        match child.id {
            TIMECODE_SCALE => scale = read_uint(reader, size)?,
            DURATION => duration = read_float(reader, size)?,
            _ => {}
        }
        pos = pos.saturating_add(header_len).saturating_add(size);
    }

    Ok(duration.and_then(|ticks| seconds(ticks * scale as f64 / 1e9)))
}

// ---------------------------------------------------------------------------
// AVI (RIFF)
// ---------------------------------------------------------------------------

fn avi_duration<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Duration>> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let riff: [u8; 4] = read_array(reader)?;
    let riff_size = u64::from(u32::from_le_bytes(read_array(reader)?));
    let form: [u8; 4] = read_array(reader)?;
    if &riff != b"RIFF" || &form != b"AVI " {
        return Ok(None);
    }
    let riff_end = (8 + riff_size).min(len);

    let Some((hdrl_start, hdrl_end)) = find_chunk(reader, 12, riff_end, b"LIST", Some(b"hdrl"))?
    else {
        return Ok(None);
    };
    let Some((avih_start, avih_end)) = find_chunk(reader, hdrl_start, hdrl_end, b"avih", None)?
    else {
        return Ok(None);
    };
    if avih_end - avih_start < 20 {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(avih_start))?;
    let micros_per_frame = u32::from_le_bytes(read_array(reader)?);
    reader.seek(SeekFrom::Current(12))?;
    let total_frames = u32::from_le_bytes(read_array(reader)?);

    if micros_per_frame == 0 || total_frames == 0 {
        return Ok(None);
    }
    let micros = u64::from(micros_per_frame) * u64::from(total_frames);
    Ok(Some(Duration::from_micros(micros)))
}

/// Finds a RIFF chunk by id in `[start, end)`. For `LIST` chunks the list
/// type must match `list_type`, and the returned body skips past it.
fn find_chunk<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    id: &[u8; 4],
    list_type: Option<&[u8; 4]>,
) -> io::Result<Option<(u64, u64)>> {
    let mut pos = start;
    for _ in 0..MAX_VISITED {
        if pos + 8 > end {
            return Ok(None);
        }
        reader.seek(SeekFrom::Start(pos))?;
        let chunk_id: [u8; 4] = read_array(reader)?;
        let size = u64::from(u32::from_le_bytes(read_array(reader)?));
        let body = pos + 8;
        let body_end = body.saturating_add(size).min(end);

        if &chunk_id == id {
            match list_type {
                None => return Ok(Some((body, body_end))),
                Some(expected) => {
                    let actual: [u8; 4] = read_array(reader)?;
                    if &actual == expected {
                        return Ok(Some((body + 4, body_end)));
                    }
                }
            }
        }
        // chunks are word aligned
        pos = body.saturating_add(size + (size & 1));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn mp4_with_duration(timescale: u32, duration: u32) -> Vec<u8> {
        let mut mvhd = vec![0u8; 4];
        mvhd.extend_from_slice(&[0; 8]);
        mvhd.extend_from_slice(&timescale.to_be_bytes());
        mvhd.extend_from_slice(&duration.to_be_bytes());
        mvhd.extend_from_slice(&[0; 80]);

        let mut file = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2mp41");
        file.extend(mp4_box(b"free", &[0; 16]));
        file.extend(mp4_box(b"mdat", &[0xAB; 512]));
        file.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));
        file
    }

    #[test]
    fn test_mp4_duration_after_mdat() {
        let data = mp4_with_duration(1000, 1_500_000);
        let duration = read_duration(&mut Cursor::new(data), Container::IsoBmff);
        assert_eq!(duration, Some(Duration::from_secs(1500)));
    }

    #[test]
    fn test_mp4_version_one_header() {
        let mut mvhd = vec![1u8, 0, 0, 0];
        mvhd.extend_from_slice(&[0; 16]);
        mvhd.extend_from_slice(&90_000u32.to_be_bytes());
        mvhd.extend_from_slice(&(90_000u64 * 60).to_be_bytes());
        let mut data = mp4_box(b"ftyp", b"isom\0\0\x02\0");
        data.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));

        let duration = read_duration(&mut Cursor::new(data), Container::IsoBmff);
        assert_eq!(duration, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_mp4_duration_out_of_range() {
        let mut mvhd = vec![1u8, 0, 0, 0];
        mvhd.extend_from_slice(&[0; 16]);
        mvhd.extend_from_slice(&1u32.to_be_bytes());
        mvhd.extend_from_slice(&(u64::MAX - 1).to_be_bytes());
        let mut data = mp4_box(b"ftyp", b"isom\0\0\x02\0");
        data.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));

        assert_eq!(read_duration(&mut Cursor::new(data), Container::IsoBmff), None);
    }

    #[test]
    fn test_seconds_rejects_unrepresentable_values() {
        assert_eq!(seconds(1e300), None);
        assert_eq!(seconds(f64::NAN), None);
        assert_eq!(seconds(-1.0), None);
        assert_eq!(seconds(2.5), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_mp4_without_moov() {
        let mut data = mp4_box(b"ftyp", b"isom\0\0\x02\0");
        data.extend(mp4_box(b"mdat", &[0; 64]));
        assert_eq!(read_duration(&mut Cursor::new(data), Container::IsoBmff), None);
    }

    #[test]
    fn test_mp4_truncated_box_size() {
        let mut data = mp4_box(b"ftyp", b"isom\0\0\x02\0");
        data.extend_from_slice(&4096u32.to_be_bytes());
        data.extend_from_slice(b"moov");
        assert_eq!(read_duration(&mut Cursor::new(data), Container::IsoBmff), None);
    }

    #[test]
    fn test_mp4_zero_timescale() {
        let data = mp4_with_duration(0, 1000);
        assert_eq!(read_duration(&mut Cursor::new(data), Container::IsoBmff), None);
    }

    fn ebml(id: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        // 8-byte size vint
        out.push(0x01);
        out.extend_from_slice(&(body.len() as u64).to_be_bytes()[1..]);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_matroska_duration() {
        let header = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &ebml(&[0x42, 0x82], b"matroska"));
        let mut info = ebml(&[0x2A, 0xD7, 0xB1], &1_000_000u32.to_be_bytes());
        info.extend(ebml(&[0x44, 0x89], &90_000.0f64.to_be_bytes()));
        let mut segment_body = ebml(&[0xEC], &[0; 32]);
        segment_body.extend(ebml(&[0x15, 0x49, 0xA9, 0x66], &info));
        let mut data = header;
        data.extend(ebml(&[0x18, 0x53, 0x80, 0x67], &segment_body));

        let duration = read_duration(&mut Cursor::new(data), Container::Matroska);
        assert_eq!(duration, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_matroska_cluster_before_info() {
        let header = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &ebml(&[0x42, 0x82], b"webm"));
        let segment_body = ebml(&[0x1F, 0x43, 0xB6, 0x75], &[0; 16]);
        let mut data = header;
        data.extend(ebml(&[0x18, 0x53, 0x80, 0x67], &segment_body));

        assert_eq!(read_duration(&mut Cursor::new(data), Container::Matroska), None);
    }

    #[test]
    fn test_avi_duration() {
        let mut avih = Vec::new();
        avih.extend_from_slice(&40_000u32.to_le_bytes()); // 25 fps
        avih.extend_from_slice(&[0; 12]);
        avih.extend_from_slice(&(25u32 * 600).to_le_bytes());
        avih.extend_from_slice(&[0; 36]);

        let mut hdrl = b"hdrl".to_vec();
        hdrl.extend_from_slice(b"avih");
        hdrl.extend_from_slice(&(avih.len() as u32).to_le_bytes());
        hdrl.extend_from_slice(&avih);

        let mut body = b"AVI ".to_vec();
        body.extend_from_slice(b"LIST");
        body.extend_from_slice(&(hdrl.len() as u32).to_le_bytes());
        body.extend_from_slice(&hdrl);

        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);

        let duration = read_duration(&mut Cursor::new(data), Container::Avi);
        assert_eq!(duration, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_container_from_mime() {
        assert_eq!(Container::from_mime("video/mp4"), Some(Container::IsoBmff));
        assert_eq!(Container::from_mime("video/webm"), Some(Container::Matroska));
        assert_eq!(Container::from_mime("video/x-msvideo"), Some(Container::Avi));
        assert_eq!(Container::from_mime("image/png"), None);
    }
}
