use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::warn;

use rivulet_core::error::LogError;

// On-disk frame: [u64 offset][u32 len][u32 crc][bytes], CRC32 over bytes.
pub(crate) const HEADER_LEN: usize = 8 + 4 + 4;

pub(crate) fn encode_frame(offset: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&offset.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn decode_header(header: &[u8; HEADER_LEN]) -> (u64, usize, u32) {
    let offset = u64::from_le_bytes(header[0..8].try_into().unwrap_or_default());
    let len = u32::from_le_bytes(header[8..12].try_into().unwrap_or_default()) as usize;
    let crc = u32::from_le_bytes(header[12..16].try_into().unwrap_or_default());
    (offset, len, crc)
}

/// Scan a partition file and return the byte position of every intact frame
/// plus the logical end position for the next append.
///
/// A short or CRC-corrupt tail frame marks the logical end of the log: the
/// scan stops there and the damaged bytes are ignored, they will be
/// overwritten by the next append.
pub(crate) async fn scan(path: &std::path::Path) -> Result<(Vec<u64>, u64), LogError> {
    let mut file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(LogError::Io(format!("open partition file failed: {}", e))),
    };
    let mut index = Vec::new();
    let mut pos = 0u64;
    let mut header = [0u8; HEADER_LEN];
    loop {
        match file.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(LogError::Io(format!("read frame header failed: {}", e))),
        }
        let (offset, len, crc) = decode_header(&header);
        let mut payload = vec![0u8; len];
        match file.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!(
                    target = "log_file",
                    path = %path.display(),
                    offset,
                    "truncated frame at end of partition file, stopping scan"
                );
                break;
            }
            Err(e) => return Err(LogError::Io(format!("read frame payload failed: {}", e))),
        }
        if crc32fast::hash(&payload) != crc || offset != index.len() as u64 {
            warn!(
                target = "log_file",
                path = %path.display(),
                offset,
                "corrupt frame detected, treating as logical end of log"
            );
            break;
        }
        index.push(pos);
        pos += (HEADER_LEN + len) as u64;
    }
    Ok((index, pos))
}

/// Read the frame starting at byte position `pos`.
pub(crate) async fn read_at(file: &mut File, pos: u64) -> Result<(u64, Vec<u8>), LogError> {
    file.seek(SeekFrom::Start(pos))
        .await
        .map_err(|e| LogError::Io(format!("seek partition file failed: {}", e)))?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header)
        .await
        .map_err(|e| LogError::Io(format!("read frame header failed: {}", e)))?;
    let (offset, len, crc) = decode_header(&header);
    let mut payload = vec![0u8; len];
    file.read_exact(&mut payload)
        .await
        .map_err(|e| LogError::Io(format!("read frame payload failed: {}", e)))?;
    if crc32fast::hash(&payload) != crc {
        return Err(LogError::Io(format!(
            "frame crc mismatch at position {}",
            pos
        )));
    }
    Ok((offset, payload))
}
