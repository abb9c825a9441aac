// SPDX-License-Identifier: Apache-2.0

//! Downstream consumers of monitor windows.
//!
//! A window produces three byte streams: the power samples (with the
//! elapsed cycle count appended), the trace events and the packaged
//! observation record. Any combination of three sinks may be enabled:
//! RAM-backed shared-memory segments, plain files or a TCP stream. The
//! monitor is indifferent to which.

use crate::error::Error;
use crate::shm::{
    ONLINE_SEGMENT_SIZE, POWER_SEGMENT_SIZE, SegmentedBuffer, TRACES_SEGMENT_SIZE,
};
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

/// One window's worth of sink input.
#[derive(Debug, Clone, Copy)]
pub struct WindowSamples<'a> {
    /// Monotonic window index.
    pub index: u64,
    /// Encoded observation record.
    pub observation: &'a [u8],
    /// Power ADC samples.
    pub power: &'a [u32],
    /// Hardware cycle count for the window.
    pub elapsed_cycles: u32,
    /// Opaque trace events.
    pub traces: &'a [u64],
}

impl WindowSamples<'_> {
    /// Power samples plus the trailing elapsed cycle count, serialized.
    #[must_use]
    pub fn power_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.power.len() * 4 + 4);
        for sample in self.power {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        buf.extend_from_slice(&self.elapsed_cycles.to_le_bytes());
        buf
    }

    /// Trace events, serialized.
    #[must_use]
    pub fn traces_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.traces.len() * 8);
        for event in self.traces {
            buf.extend_from_slice(&event.to_le_bytes());
        }
        buf
    }
}

/// A downstream consumer of monitor windows.
pub trait ObservationSink: Send {
    /// Consumes one window.
    fn emit(&mut self, window: &WindowSamples<'_>) -> Result<(), Error>;

    /// Flushes buffered state at shutdown.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes per-window files under an output directory.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// A sink writing into `dir`, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self, Error> {
        std::fs::create_dir_all(dir).map_err(|source| Error::SinkIo {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn write(&self, name: String, bytes: &[u8]) -> Result<(), Error> {
        let path = self.dir.join(name);
        std::fs::write(&path, bytes).map_err(|source| Error::SinkIo { path, source })
    }
}

impl ObservationSink for FileSink {
    fn emit(&mut self, window: &WindowSamples<'_>) -> Result<(), Error> {
        self.write(format!("CON_{}.bin", window.index), &window.power_bytes())?;
        self.write(format!("SIG_{}.bin", window.index), &window.traces_bytes())?;
        self.write(format!("online_{}.bin", window.index), window.observation)
    }
}

/// Streams windows over a TCP connection.
#[derive(Debug)]
pub struct TcpSink {
    stream: TcpStream,
    addr: String,
}

impl TcpSink {
    /// Connects to `addr`.
    pub fn connect(addr: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).map_err(|source| Error::SinkSocket {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            stream,
            addr: addr.to_string(),
        })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.stream
            .write_all(bytes)
            .map_err(|source| Error::SinkSocket {
                addr: self.addr.clone(),
                source,
            })
    }
}

impl ObservationSink for TcpSink {
    fn emit(&mut self, window: &WindowSamples<'_>) -> Result<(), Error> {
        self.send(&window.power_bytes())?;
        self.send(&window.traces_bytes())?;
        self.send(window.observation)
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.stream.flush().map_err(|source| Error::SinkSocket {
            addr: self.addr.clone(),
            source,
        })
    }
}

/// Writes windows into RAM-backed segmented buffers shared with a
/// downstream process.
#[derive(Debug)]
pub struct ShmSink {
    power: SegmentedBuffer,
    traces: SegmentedBuffer,
    online: SegmentedBuffer,
}

impl ShmSink {
    /// Maps the three buffers under `dir`, one segment per window of a
    /// training period. A single-measurement period still gets two segments
    /// (the classic ping-pong) so the reader side never races the writer.
    pub fn new(dir: &Path, measurements_per_training: u32) -> Result<Self, Error> {
        let segments = (measurements_per_training.max(2)) as usize;
        Ok(Self {
            power: SegmentedBuffer::create(&dir.join("power_file"), POWER_SEGMENT_SIZE, segments)?,
            traces: SegmentedBuffer::create(
                &dir.join("traces_file"),
                TRACES_SEGMENT_SIZE,
                segments,
            )?,
            online: SegmentedBuffer::create(
                &dir.join("online_file"),
                ONLINE_SEGMENT_SIZE,
                segments,
            )?,
        })
    }
}

impl ObservationSink for ShmSink {
    fn emit(&mut self, window: &WindowSamples<'_>) -> Result<(), Error> {
        self.power.write_segment(&window.power_bytes())?;
        self.traces.write_segment(&window.traces_bytes())?;
        self.online.write_segment(window.observation)?;
        self.power.toggle();
        self.traces.toggle();
        self.online.toggle();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.power.flush()?;
        self.traces.flush()?;
        self.online.flush()
    }
}

/// The enabled sinks for one run.
pub struct SinkSet {
    sinks: Vec<Box<dyn ObservationSink>>,
}

impl SinkSet {
    /// A set over explicit sinks. Tests inject capture sinks this way.
    #[must_use]
    pub fn new(sinks: Vec<Box<dyn ObservationSink>>) -> Self {
        Self { sinks }
    }

    /// Builds the sinks selected by the configuration.
    ///
    /// `shm_dir` is where the RAM-backed maps live (a tmpfs on the board).
    pub fn from_settings(
        settings: &awm_config::settings::SinkSettings,
        measurements_per_training: u32,
        shm_dir: &Path,
    ) -> Result<Self, Error> {
        let mut sinks: Vec<Box<dyn ObservationSink>> = Vec::new();
        if settings.ram {
            sinks.push(Box::new(ShmSink::new(shm_dir, measurements_per_training)?));
        }
        if settings.file {
            sinks.push(Box::new(FileSink::new(&settings.output_dir)?));
        }
        if settings.socket {
            sinks.push(Box::new(TcpSink::connect(&settings.socket_addr)?));
        }
        Ok(Self { sinks })
    }

    /// Emits one window into every enabled sink.
    pub fn emit(&mut self, window: &WindowSamples<'_>) -> Result<(), Error> {
        for sink in &mut self.sinks {
            sink.emit(window)?;
        }
        Ok(())
    }

    /// Flushes every sink.
    pub fn flush(&mut self) -> Result<(), Error> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn sample_window<'a>(observation: &'a [u8], power: &'a [u32], traces: &'a [u64]) -> WindowSamples<'a> {
        WindowSamples {
            index: 0,
            observation,
            power,
            elapsed_cycles: 77,
            traces,
        }
    }

    #[test]
    fn file_sink_writes_the_three_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = FileSink::new(dir.path()).expect("sink");
        let observation = [9u8; 12];
        let window = sample_window(&observation, &[1, 2, 3], &[4, 5]);
        sink.emit(&window).expect("emit");

        let power = std::fs::read(dir.path().join("CON_0.bin")).expect("power");
        assert_eq!(power.len(), 3 * 4 + 4);
        assert_eq!(&power[12..], &77u32.to_le_bytes());
        let traces = std::fs::read(dir.path().join("SIG_0.bin")).expect("traces");
        assert_eq!(traces.len(), 16);
        let online = std::fs::read(dir.path().join("online_0.bin")).expect("online");
        assert_eq!(online, observation);
    }

    #[test]
    fn shm_sink_stamps_segment_lengths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = ShmSink::new(dir.path(), 4).expect("sink");
        let observation = [1u8; 20];
        let window = sample_window(&observation, &[0xAAAA; 8], &[0xBB; 4]);
        sink.emit(&window).expect("emit");
        sink.flush().expect("flush");

        let online = std::fs::read(dir.path().join("online_file")).expect("map file");
        assert_eq!(online.len(), ONLINE_SEGMENT_SIZE * 4);
        let count_at = ONLINE_SEGMENT_SIZE - 4;
        assert_eq!(
            i32::from_le_bytes([
                online[count_at],
                online[count_at + 1],
                online[count_at + 2],
                online[count_at + 3]
            ]),
            20
        );
    }

    #[test]
    fn tcp_sink_streams_all_bytes() {
        let port = portpicker::pick_unused_port().expect("port");
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind");
        let addr = format!("127.0.0.1:{port}");

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut bytes = Vec::new();
            let _ = stream.read_to_end(&mut bytes).expect("read");
            bytes
        });

        let observation = [3u8; 6];
        {
            let mut sink = TcpSink::connect(&addr).expect("connect");
            let window = sample_window(&observation, &[1], &[2]);
            sink.emit(&window).expect("emit");
            sink.flush().expect("flush");
        }
        let received = server.join().expect("join");
        // power (4) + elapsed (4) + traces (8) + observation (6)
        assert_eq!(received.len(), 22);
        assert_eq!(&received[16..], &observation);
    }
}
