// SPDX-License-Identifier: Apache-2.0

//! Socket client for the oracle channels.

use crate::error::{Channel, Error};
use crate::wire::{
    DECISION_LEN, Features, Metrics, Prediction, ScheduleDecision, TrainingRequest,
};
use crate::ModelOracle;
use awm_config::BoardClass;
use awm_config::settings::OracleSettings;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use tracing::{debug, info};

/// Blocking client over the two oracle stream sockets.
///
/// Connection establishment uses filesystem-path addressing; no timeouts are
/// applied because the oracle is assumed responsive.
pub struct OracleClient {
    training: UnixStream,
    prediction: UnixStream,
    board: BoardClass,
}

impl OracleClient {
    /// Connects both channels.
    ///
    /// When the downstream shares RAM buffers, `ram_measurements` carries the
    /// per-training observation count announced in the connect handshake so
    /// the oracle can size its buffer view.
    pub fn connect(
        settings: &OracleSettings,
        board: BoardClass,
        ram_measurements: Option<u32>,
    ) -> Result<Self, Error> {
        let training =
            UnixStream::connect(&settings.training_socket).map_err(|source| Error::Connect {
                channel: Channel::Training,
                path: settings.training_socket.clone(),
                source,
            })?;
        debug!(path = %settings.training_socket.display(), "training channel connected");

        let mut client = Self {
            training,
            prediction: UnixStream::connect(&settings.prediction_socket).map_err(|source| {
                Error::Connect {
                    channel: Channel::Prediction,
                    path: settings.prediction_socket.clone(),
                    source,
                }
            })?,
            board,
        };
        debug!(path = %settings.prediction_socket.display(), "prediction channel connected");

        if let Some(measurements) = ram_measurements {
            client.send_training(&measurements.to_le_bytes())?;
            let mut ack = [0u8; 4];
            client.recv_training(&mut ack)?;
            info!(ack = i32::from_le_bytes(ack), "oracle acknowledged buffer sizing");
        }
        Ok(client)
    }

    fn send_training(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.training
            .write_all(bytes)
            .map_err(|source| Error::Send {
                channel: Channel::Training,
                source,
            })
    }

    fn recv_training(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        self.training
            .read_exact(bytes)
            .map_err(|source| Error::Recv {
                channel: Channel::Training,
                source,
            })
    }

    fn send_prediction(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.prediction
            .write_all(bytes)
            .map_err(|source| Error::Send {
                channel: Channel::Prediction,
                source,
            })
    }

    fn recv_prediction(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        self.prediction
            .read_exact(bytes)
            .map_err(|source| Error::Recv {
                channel: Channel::Prediction,
                source,
            })
    }

    fn recv_metrics(&mut self) -> Result<Metrics, Error> {
        let mut buf = vec![0u8; Metrics::wire_len(self.board)];
        self.recv_training(&mut buf)?;
        Metrics::decode(&buf, self.board)
    }
}

impl ModelOracle for OracleClient {
    fn operate(&mut self, observations: u32) -> Result<i32, Error> {
        let word = TrainingRequest::Operate(observations).to_wire();
        self.send_training(&word.to_le_bytes())?;
        let mut reply = [0u8; 4];
        self.recv_training(&mut reply)?;
        let idle_obs = i32::from_le_bytes(reply);
        debug!(observations, idle_obs, "oracle operate round-trip");
        Ok(idle_obs)
    }

    fn train(&mut self, observations: u32) -> Result<Metrics, Error> {
        let word = TrainingRequest::Train(observations).to_wire();
        self.send_training(&word.to_le_bytes())?;
        let metrics = self.recv_metrics()?;
        info!(
            time_error = metrics.time_error,
            power_error = ?metrics.power_error,
            "training metrics"
        );
        Ok(metrics)
    }

    fn test(&mut self, observations: u32) -> Result<Metrics, Error> {
        // Same wire form as operate; the reply is a metrics frame instead.
        let word = TrainingRequest::Operate(observations).to_wire();
        self.send_training(&word.to_le_bytes())?;
        let metrics = self.recv_metrics()?;
        info!(
            time_error = metrics.time_error,
            power_error = ?metrics.power_error,
            "test metrics"
        );
        Ok(metrics)
    }

    fn workload_boundary(&mut self) -> Result<(), Error> {
        let word = TrainingRequest::WorkloadBoundary.to_wire();
        self.send_training(&word.to_le_bytes())
    }

    fn predict(&mut self, features: &Features) -> Result<Prediction, Error> {
        self.send_prediction(&features.encode())?;
        let mut buf = vec![0u8; Prediction::wire_len(self.board)];
        self.recv_prediction(&mut buf)?;
        Prediction::decode(&buf, self.board)
    }

    fn schedule(&mut self, features: &Features) -> Result<ScheduleDecision, Error> {
        self.send_prediction(&features.encode())?;
        let mut buf = [0u8; DECISION_LEN];
        self.recv_prediction(&mut buf)?;
        Ok(ScheduleDecision::decode(&buf))
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        let word = TrainingRequest::Shutdown.to_wire();
        self.send_training(&word.to_le_bytes())?;
        // The prediction side expects a single zero byte.
        self.send_prediction(&[0u8])?;
        // No replies follow; closing the write halves lets the peer tell the
        // one-byte shutdown apart from the head of a features frame.
        let _ = self.training.shutdown(std::net::Shutdown::Write);
        let _ = self.prediction.shutdown(std::net::Shutdown::Write);
        Ok(())
    }
}
