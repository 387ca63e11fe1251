//! Memory-mapped reader and atomic-rename writer for a single column file.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, instrument, warn};
use wx_common::{WxError, WxResult};

use crate::codec::{decode_chunk, dequantize, encode_chunk, quantize};
use crate::header::{
    parse_chunk_index, serialize_chunk_index, ChunkIndexEntry, Header, HEADER_LEN,
};

/// A read-only, memory-mapped column file.
pub struct ColumnFile {
    path: PathBuf,
    mmap: Mmap,
    header: Header,
    chunk_index: Vec<ChunkIndexEntry>,
}

impl ColumnFile {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> WxResult<Self> {
        let file = File::open(path).map_err(|e| WxError::io(path.display().to_string(), e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| WxError::io(path.display().to_string(), e))?;
        let path_str = path.display().to_string();
        let header = Header::parse(&path_str, &mmap)?;
        let chunk_index = parse_chunk_index(&path_str, &mmap, &header)?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            chunk_index,
        })
    }

    /// Open with up to `max_retries` extra attempts if the failure looks
    /// like a concurrent-rename race (`ENOENT` or magic mismatch).
    pub fn open_retrying(path: &Path, max_retries: u32) -> WxResult<Self> {
        let mut last_err = None;
        for attempt in 0..=max_retries {
            match Self::open(path) {
                Ok(f) => return Ok(f),
                Err(e) if e.is_retryable_open() && attempt < max_retries => {
                    warn!(path = %path.display(), attempt, "retrying column file open after rename race");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.expect("loop always sets last_err before exhausting retries"))
    }

    pub fn n_locations(&self) -> u64 {
        self.header.n_locations
    }

    pub fn n_time(&self) -> u64 {
        self.header.n_time
    }

    pub fn scalefactor(&self) -> f32 {
        self.header.scalefactor
    }

    fn chunk_rows(&self, loc_chunk: u64) -> usize {
        let start = loc_chunk * self.header.chunk_loc as u64;
        (self.header.n_locations - start).min(self.header.chunk_loc as u64) as usize
    }

    fn chunk_cols(&self, time_chunk: u64) -> usize {
        let start = time_chunk * self.header.chunk_time as u64;
        (self.header.n_time - start).min(self.header.chunk_time as u64) as usize
    }

    fn decode_chunk_at(&self, chunk_id: u64) -> Vec<i16> {
        let loc_chunk = chunk_id / self.header.chunks_y();
        let time_chunk = chunk_id % self.header.chunks_y();
        let rows = self.chunk_rows(loc_chunk);
        let cols = self.chunk_cols(time_chunk);
        let entry = self.chunk_index[chunk_id as usize];
        if entry.length == 0 {
            return vec![i16::MIN; rows * cols];
        }
        let payload_start = self.header.payload_start();
        let start = payload_start + entry.offset as usize;
        let end = start + entry.length as usize;
        decode_chunk(&self.mmap[start..end], rows, cols)
    }

    /// `location`: absolute location index. `time_start`/`time_count`:
    /// file-local time indices (0 == the file's first stored timestep);
    /// indices outside `[0, nTime)` decode to `NaN` rather than erroring.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self, location: u64, time_start: i64, time_count: usize) -> WxResult<Vec<f32>> {
        if location >= self.header.n_locations {
            return Err(WxError::out_of_range(location, self.header.n_locations));
        }
        let mut out = vec![f32::NAN; time_count];
        let loc_chunk = location / self.header.chunk_loc as u64;
        let loc_in_chunk = (location % self.header.chunk_loc as u64) as usize;

        let mut cached_chunk: Option<(u64, Vec<i16>)> = None;

        for (i, slot) in out.iter_mut().enumerate() {
            let t = time_start + i as i64;
            if t < 0 || t as u64 >= self.header.n_time {
                continue; // out-of-file: stays NaN
            }
            let t = t as u64;
            let time_chunk = t / self.header.chunk_time as u64;
            let chunk_id = self.header.chunk_id(loc_chunk, time_chunk);

            if cached_chunk.as_ref().map(|(id, _)| *id) != Some(chunk_id) {
                cached_chunk = Some((chunk_id, self.decode_chunk_at(chunk_id)));
            }
            let (_, decoded) = cached_chunk.as_ref().unwrap();
            let cols = self.chunk_cols(time_chunk);
            let t_in_chunk = (t % self.header.chunk_time as u64) as usize;
            let q = decoded[loc_in_chunk * cols + t_in_chunk];
            *slot = dequantize(q, self.header.scalefactor);
        }

        Ok(out)
    }

    /// Advisory prefetch over a location range and file-local time range.
    /// Never fails; a platform without `madvise` support is a silent no-op.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn will_need(&self, loc_start: u64, loc_count: u64, time_start: i64, time_count: usize) {
        let loc_end = (loc_start + loc_count).min(self.header.n_locations);
        let time_end = (time_start + time_count as i64).clamp(0, self.header.n_time as i64) as u64;
        let time_start = time_start.max(0) as u64;
        if loc_start >= loc_end || time_start >= time_end {
            return;
        }

        let first_loc_chunk = loc_start / self.header.chunk_loc as u64;
        let last_loc_chunk = (loc_end - 1) / self.header.chunk_loc as u64;
        let first_time_chunk = time_start / self.header.chunk_time as u64;
        let last_time_chunk = (time_end - 1) / self.header.chunk_time as u64;

        let payload_start = self.header.payload_start();
        for lc in first_loc_chunk..=last_loc_chunk {
            for tc in first_time_chunk..=last_time_chunk {
                let chunk_id = self.header.chunk_id(lc, tc);
                let entry = self.chunk_index[chunk_id as usize];
                if entry.length == 0 {
                    continue;
                }
                let start = payload_start + entry.offset as usize;
                let len = entry.length as usize;
                self.advise_will_need(start, len);
            }
        }
        debug!(loc_start, loc_count, time_start, time_count, "issued willNeed prefetch");
    }

    #[cfg(unix)]
    fn advise_will_need(&self, offset: usize, len: usize) {
        use memmap2::Advice;
        let _ = self.mmap.advise_range(Advice::WillNeed, offset, len);
    }

    #[cfg(not(unix))]
    fn advise_will_need(&self, _offset: usize, _len: usize) {}
}

/// Writes a full dense `[nLocations x nTime]` (location-major, time-minor)
/// array to a column file via temp-file-then-rename. Partial in-place
/// updates are expressed by the Splitter as "decode, overlay, re-encode
/// the whole shard", not by this writer.
#[instrument(skip(values), fields(path = %path.display(), n_locations, n_time))]
pub fn write_dense(
    path: &Path,
    n_locations: u64,
    n_time: u64,
    chunk_loc: u32,
    chunk_time: u32,
    scalefactor: f32,
    values: &[f32],
) -> WxResult<()> {
    assert_eq!(values.len() as u64, n_locations * n_time);

    let header = Header {
        n_locations,
        n_time,
        chunk_loc,
        chunk_time,
        scalefactor,
    };
    let chunks_x = header.chunks_x();
    let chunks_y = header.chunks_y();

    let mut index = Vec::with_capacity((chunks_x * chunks_y) as usize);
    let mut payload = Vec::new();

    for lc in 0..chunks_x {
        let loc_start = lc * chunk_loc as u64;
        let rows = (n_locations - loc_start).min(chunk_loc as u64) as usize;
        for tc in 0..chunks_y {
            let time_start = tc * chunk_time as u64;
            let cols = (n_time - time_start).min(chunk_time as u64) as usize;

            let mut q = vec![0i16; rows * cols];
            let mut any_present = false;
            for r in 0..rows {
                let loc = loc_start + r as u64;
                for c in 0..cols {
                    let t = time_start + c as u64;
                    let v = values[(loc * n_time + t) as usize];
                    let code = quantize(v, scalefactor);
                    if code != i16::MIN {
                        any_present = true;
                    }
                    q[r * cols + c] = code;
                }
            }

            if !any_present {
                index.push(ChunkIndexEntry { offset: 0, length: 0 });
                continue;
            }

            let encoded = encode_chunk(&q, rows, cols);
            index.push(ChunkIndexEntry {
                offset: payload.len() as u64,
                length: encoded.len() as u32,
            });
            payload.extend_from_slice(&encoded);
        }
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + index.len() * 12 + payload.len());
    buf.extend_from_slice(&header.serialize());
    buf.extend_from_slice(&serialize_chunk_index(&index));
    buf.extend_from_slice(&payload);

    atomic_write(path, &buf)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> WxResult<()> {
    let tmp_path = temp_sibling_path(path);
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| WxError::io(tmp_path.display().to_string(), e))?;
        tmp.write_all(bytes)
            .map_err(|e| WxError::io(tmp_path.display().to_string(), e))?;
        tmp.sync_all()
            .map_err(|e| WxError::io(tmp_path.display().to_string(), e))?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| WxError::io(path.display().to_string(), e))?;
    Ok(())
}

fn temp_sibling_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("column");
    let pid = std::process::id();
    path.with_file_name(format!(".{file_name}.tmp-{pid}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_point_read_ramp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let n_locations = 100u64;
        let n_time = 240u64;
        let scalefactor = 20.0f32;

        let mut values = vec![0f32; (n_locations * n_time) as usize];
        for loc in 0..n_locations {
            for t in 0..n_time {
                values[(loc * n_time + t) as usize] = loc as f32 + t as f32 / 24.0;
            }
        }

        write_dense(&path, n_locations, n_time, 6, 183, scalefactor, &values).unwrap();

        let file = ColumnFile::open(&path).unwrap();
        let read = file.read(42, 10, 10).unwrap();
        for (i, v) in read.iter().enumerate() {
            let expected = 42.0 + (10 + i) as f32 / 24.0;
            assert!((v - expected).abs() <= 0.025, "i={i} v={v} expected={expected}");
        }
    }

    #[test]
    fn missing_handling_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let n_locations = 100u64;
        let n_time = 240u64;

        let mut values = vec![0f32; (n_locations * n_time) as usize];
        for loc in 0..n_locations {
            for t in 0..n_time {
                values[(loc * n_time + t) as usize] = loc as f32 + t as f32 / 24.0;
            }
        }
        values[(42 * n_time + 15) as usize] = f32::NAN;

        write_dense(&path, n_locations, n_time, 6, 183, 20.0, &values).unwrap();
        let file = ColumnFile::open(&path).unwrap();
        let read = file.read(42, 10, 10).unwrap();
        assert!(read[5].is_nan());
        for (i, v) in read.iter().enumerate() {
            if i == 5 {
                continue;
            }
            let expected = 42.0 + (10 + i) as f32 / 24.0;
            assert!((v - expected).abs() <= 0.025);
        }
    }

    #[test]
    fn out_of_file_timesteps_are_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let values = vec![1.0f32; 10 * 5];
        write_dense(&path, 10, 5, 6, 3, 10.0, &values).unwrap();
        let file = ColumnFile::open(&path).unwrap();
        let read = file.read(0, -2, 8).unwrap(); // window straddles before file start and past end
        assert!(read[0].is_nan());
        assert!(read[1].is_nan());
        assert!(!read[2].is_nan());
        assert!(read[7].is_nan());
    }

    #[test]
    fn out_of_range_location_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let values = vec![1.0f32; 10 * 5];
        write_dense(&path, 10, 5, 6, 3, 10.0, &values).unwrap();
        let file = ColumnFile::open(&path).unwrap();
        assert!(file.read(10, 0, 5).is_err());
    }

    #[test]
    fn chunking_invariance_same_values_different_chunk_dims() {
        let dir = tempdir().unwrap();
        let n_locations = 37u64;
        let n_time = 97u64;
        let mut values = vec![0f32; (n_locations * n_time) as usize];
        for loc in 0..n_locations {
            for t in 0..n_time {
                values[(loc * n_time + t) as usize] = (loc as f32 * 3.1 + t as f32 * 0.7).sin() * 50.0;
            }
        }

        let path_a = dir.path().join("a.om");
        let path_b = dir.path().join("b.om");
        write_dense(&path_a, n_locations, n_time, 4, 11, 100.0, &values).unwrap();
        write_dense(&path_b, n_locations, n_time, 9, 40, 100.0, &values).unwrap();

        let fa = ColumnFile::open(&path_a).unwrap();
        let fb = ColumnFile::open(&path_b).unwrap();
        for loc in 0..n_locations {
            let ra = fa.read(loc, 0, n_time as usize).unwrap();
            let rb = fb.read(loc, 0, n_time as usize).unwrap();
            assert_eq!(ra, rb, "location {loc} differs between chunkings");
        }
    }

    #[test]
    fn open_retrying_succeeds_once_file_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let values = vec![1.0f32; 10 * 5];
        write_dense(&path, 10, 5, 6, 3, 10.0, &values).unwrap();
        let file = ColumnFile::open_retrying(&path, 3).unwrap();
        assert_eq!(file.n_locations(), 10);
    }

    #[test]
    fn open_retrying_exhausts_on_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.om");
        let err = ColumnFile::open_retrying(&path, 3).unwrap_err();
        assert!(err.is_retryable_open());
    }

    /// §8 "atomic publish": a writer repeatedly rewrites location 0, time 0
    /// with a new generation number via `write_dense`'s temp-then-rename,
    /// while readers race it with `open_retrying`. A reader must only ever
    /// observe one full generation's value, never a torn mix of two.
    #[test]
    fn atomic_publish_never_exposes_a_torn_write() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::thread;

        const GENERATIONS: usize = 30;

        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let n_locations = 4u64;
        let n_time = 4u64;

        let write_generation = |path: &Path, generation: f32| {
            let mut values = vec![0f32; (n_locations * n_time) as usize];
            values[0] = generation;
            write_dense(path, n_locations, n_time, 4, 4, 1.0, &values).unwrap();
        };

        // Ensure the file exists before readers start.
        write_generation(&path, 0.0);

        let stop = Arc::new(AtomicBool::new(false));
        let observed_bad = Arc::new(AtomicUsize::new(0));

        let writer_path = path.clone();
        let writer_stop = Arc::clone(&stop);
        let writer = thread::spawn(move || {
            for generation in 1..GENERATIONS {
                write_generation(&writer_path, generation as f32);
            }
            writer_stop.store(true, Ordering::SeqCst);
        });

        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader_path = path.clone();
            let reader_stop = Arc::clone(&stop);
            let reader_bad = Arc::clone(&observed_bad);
            readers.push(thread::spawn(move || {
                while !reader_stop.load(Ordering::SeqCst) {
                    match ColumnFile::open_retrying(&reader_path, 3) {
                        Ok(file) => {
                            let read = file.read(0, 0, 1).unwrap();
                            let v = read[0];
                            if v < 0.0 || v >= GENERATIONS as f32 || v.fract() != 0.0 {
                                reader_bad.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        Err(e) => {
                            // Only a transient rename race is acceptable, and
                            // only after the writer has moved on.
                            assert!(e.is_retryable_open());
                        }
                    }
                }
            }));
        }

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }

        assert_eq!(observed_bad.load(Ordering::SeqCst), 0, "reader observed a torn or out-of-range generation value");
    }
}
