// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the oracle.
//!
//! [`ScriptedOracle`] is an in-memory [`ModelOracle`] with programmable
//! replies and call counters, used by the scheduler and monitor tests.
//! [`SocketOracleServer`] is a minimal wire-level peer used to exercise the
//! real socket client.

use crate::error::Error;
use crate::wire::{
    FEATURES_LEN, Features, Metrics, Prediction, ScheduleDecision, TrainingRequest,
};
use crate::ModelOracle;
use awm_config::BoardClass;
use awm_config::settings::OracleSettings;
use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::thread::JoinHandle;

type PredictFn = Box<dyn FnMut(&Features) -> Prediction + Send>;
type ScheduleFn = Box<dyn FnMut(&Features) -> ScheduleDecision + Send>;

/// Programmable in-memory oracle.
pub struct ScriptedOracle {
    predict_fn: PredictFn,
    schedule_fn: ScheduleFn,
    idle_obs: i32,
    /// Number of `predict` calls served so far.
    pub predict_calls: u32,
    /// Number of `schedule` calls served so far.
    pub schedule_calls: u32,
    /// Number of `operate` calls served so far.
    pub operate_calls: u32,
    /// Number of workload boundaries received.
    pub boundaries: u32,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedOracle {
    /// An oracle that predicts a constant 1 ms and recommends nothing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            predict_fn: Box::new(|_| Prediction {
                power: vec![1.0],
                time: 1.0,
            }),
            schedule_fn: Box::new(|_| ScheduleDecision::default()),
            idle_obs: 0,
            predict_calls: 0,
            schedule_calls: 0,
            operate_calls: 0,
            boundaries: 0,
        }
    }

    /// Replaces the prediction rule.
    #[must_use]
    pub fn with_predict(mut self, f: impl FnMut(&Features) -> Prediction + Send + 'static) -> Self {
        self.predict_fn = Box::new(f);
        self
    }

    /// Replaces the scheduling rule.
    #[must_use]
    pub fn with_schedule(
        mut self,
        f: impl FnMut(&Features) -> ScheduleDecision + Send + 'static,
    ) -> Self {
        self.schedule_fn = Box::new(f);
        self
    }

    /// Sets the idle-observation count returned by `operate`.
    #[must_use]
    pub fn with_idle_obs(mut self, idle_obs: i32) -> Self {
        self.idle_obs = idle_obs;
        self
    }
}

impl ModelOracle for ScriptedOracle {
    fn operate(&mut self, _observations: u32) -> Result<i32, Error> {
        self.operate_calls += 1;
        Ok(self.idle_obs)
    }

    fn train(&mut self, _observations: u32) -> Result<Metrics, Error> {
        Ok(Metrics {
            power_error: vec![0.0],
            time_error: 0.0,
        })
    }

    fn test(&mut self, _observations: u32) -> Result<Metrics, Error> {
        Ok(Metrics {
            power_error: vec![0.0],
            time_error: 0.0,
        })
    }

    fn workload_boundary(&mut self) -> Result<(), Error> {
        self.boundaries += 1;
        Ok(())
    }

    fn predict(&mut self, features: &Features) -> Result<Prediction, Error> {
        self.predict_calls += 1;
        Ok((self.predict_fn)(features))
    }

    fn schedule(&mut self, features: &Features) -> Result<ScheduleDecision, Error> {
        self.schedule_calls += 1;
        Ok((self.schedule_fn)(features))
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Wire-level fake of the external learner for client tests.
///
/// Serves exactly one connection per channel. The training side expects the
/// RAM-buffer handshake first, then answers `operate` with `3` and train
/// commands with zeroed metrics. The prediction side answers predictions
/// with a 5 ms estimate and scheduling queries with `{kmp: 2, knn: 1}`.
pub struct SocketOracleServer {
    handles: Vec<JoinHandle<()>>,
}

impl SocketOracleServer {
    /// Binds both sockets and spawns the serving threads.
    pub fn spawn(settings: &OracleSettings, board: BoardClass) -> std::io::Result<Self> {
        let training = UnixListener::bind(&settings.training_socket)?;
        let prediction = UnixListener::bind(&settings.prediction_socket)?;

        let training_handle = std::thread::spawn(move || serve_training(&training, board));
        let prediction_handle = std::thread::spawn(move || serve_prediction(&prediction, board));

        Ok(Self {
            handles: vec![training_handle, prediction_handle],
        })
    }

    /// Waits for both serving threads to finish.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn serve_training(listener: &UnixListener, board: BoardClass) {
    let Ok((mut stream, _)) = listener.accept() else {
        return;
    };

    // Connect handshake: observation count in, ack out.
    let mut word = [0u8; 4];
    if stream.read_exact(&mut word).is_err() {
        return;
    }
    let _ = stream.write_all(&0i32.to_le_bytes());

    loop {
        let mut word = [0u8; 4];
        if stream.read_exact(&mut word).is_err() {
            return;
        }
        match TrainingRequest::from_wire(u32::from_le_bytes(word)) {
            TrainingRequest::Shutdown => return,
            TrainingRequest::WorkloadBoundary => {}
            TrainingRequest::Operate(_) => {
                let _ = stream.write_all(&3i32.to_le_bytes());
            }
            TrainingRequest::Train(_) => {
                let metrics = Metrics {
                    power_error: vec![0.0; board.power_channels()],
                    time_error: 0.0,
                };
                if let Ok(frame) = metrics.encode(board) {
                    let _ = stream.write_all(&frame);
                }
            }
        }
    }
}

fn serve_prediction(listener: &UnixListener, board: BoardClass) {
    let Ok((mut stream, _)) = listener.accept() else {
        return;
    };

    loop {
        // The shutdown message is a single zero byte; everything else is a
        // full features frame. Read one byte, then complete the frame.
        let mut buf = [0u8; FEATURES_LEN];
        let n = match stream.read(&mut buf[..1]) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        debug_assert_eq!(n, 1);
        if buf[0] == 0 {
            // Either a shutdown byte or the first byte of a frame. Probe for
            // the rest of the frame; end-of-stream here means shutdown.
            match stream.read_exact(&mut buf[1..]) {
                Ok(()) => {}
                Err(_) => return,
            }
        } else if stream.read_exact(&mut buf[1..]).is_err() {
            return;
        }

        let features = Features::decode(&buf);
        if features.is_schedule_request() {
            let mut decision = ScheduleDecision::default();
            decision.cu[awm_config::KernelId::Kmp.index()] = 2;
            decision.cu[awm_config::KernelId::Knn.index()] = 1;
            let _ = stream.write_all(&decision.encode());
        } else {
            let prediction = Prediction {
                power: vec![1.0; board.power_channels()],
                time: 5.0,
            };
            if let Ok(frame) = prediction.encode(board) {
                let _ = stream.write_all(&frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awm_config::KernelId;

    #[test]
    fn scripted_oracle_counts_calls() {
        let mut oracle = ScriptedOracle::new().with_idle_obs(5);
        assert_eq!(oracle.operate(10).expect("operate"), 5);
        let features = Features::prediction((0.0, 0.0, 100.0), KernelId::Aes, [0; 11]);
        let _ = oracle.predict(&features).expect("predict");
        let _ = oracle.predict(&features).expect("predict");
        assert_eq!(oracle.operate_calls, 1);
        assert_eq!(oracle.predict_calls, 2);
    }
}
