//! Tube entre l'étape A et l'étape B d'un couloir
//!
//! `StagePipe` possède les deux processus. La sortie standard de l'étape A
//! est recopiée dans l'entrée standard de l'étape B par une tâche de pompage
//! à tampon borné: l'étape B ne peut pas dépasser le débit de l'étape A et,
//! si l'étape A est plus rapide, elle bloque sur l'écriture. La fin de l'étape
//! A et celle de l'étape B sont exposées comme deux événements distincts.
//! Le pompage n'est jamais interrompu: même si l'étape A échoue, ce qu'elle a
//! déjà écrit parvient à l'étape B avant la fin de son entrée.

use super::invocation::{Stage, StageInvocation};
use super::LaneError;
use crate::lane_log::LaneLogger;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

/// Code de sortie d'une étape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageExit {
    /// `None` si le processus a été tué par un signal
    pub code: Option<i32>,
}

impl StageExit {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn failed(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn killed() -> Self {
        Self { code: None }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for StageExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Événement observé sur le tube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEvent {
    StageAExited(StageExit),
    StageBExited(StageExit),
}

/// Règle de propagation des échecs entre les deux étapes
///
/// Un échec de l'étape B l'emporte (l'étape A a pu être tuée à cause de
/// lui). Sinon un échec de l'étape A est remonté. Sinon le couloir réussit.
pub fn resolve_lane_result(stage_a: StageExit, stage_b: StageExit) -> Result<(), LaneError> {
    if !stage_b.is_success() {
        return Err(LaneError::StageFailed {
            stage: Stage::IndexDecoder,
            code: stage_b.code,
        });
    }
    if !stage_a.is_success() {
        return Err(LaneError::StageFailed {
            stage: Stage::BasecallDecoder,
            code: stage_a.code,
        });
    }
    Ok(())
}

/// Relaie un flux ligne par ligne jusqu'à sa fin
///
/// Les outils écrivent parfois des octets hors UTF-8: ils sont remplacés à
/// l'affichage et le flux continue d'être vidé, sinon l'outil recevrait
/// SIGPIPE.
fn forward_lines<R>(reader: R, stage: Stage, logger: Arc<dyn LaneLogger>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    logger.info(&format!("[{}] {}", stage, line.trim_end_matches(['\n', '\r'])));
                }
                Err(e) => {
                    logger.warn(&format!("[{}] lecture du flux interrompue: {}", stage, e));
                    break;
                }
            }
        }
    })
}

fn pump(mut from: ChildStdout, mut to: ChildStdin) -> JoinHandle<std::io::Result<u64>> {
    tokio::spawn(async move {
        let copied = tokio::io::copy(&mut from, &mut to).await;
        // Fin d'entrée explicite pour l'étape B
        let _ = to.shutdown().await;
        drop(to);
        copied
    })
}

/// Les deux processus d'un couloir reliés par un tube
pub struct StagePipe {
    stage_a: Child,
    stage_b: Child,
    stage_a_done: bool,
    stage_b_done: bool,
    pump: Option<JoinHandle<std::io::Result<u64>>>,
    forwarders: Vec<JoinHandle<()>>,
    logger: Arc<dyn LaneLogger>,
}

impl StagePipe {
    /// Démarre les deux étapes et les relie
    pub fn spawn(
        stage_a: &StageInvocation,
        stage_b: &StageInvocation,
        logger: Arc<dyn LaneLogger>,
    ) -> Result<Self, LaneError> {
        let mut child_a = stage_a
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaneError::Spawn {
                stage: stage_a.stage,
                source,
            })?;

        let mut child_b = match stage_b
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                let _ = child_a.start_kill();
                return Err(LaneError::Spawn {
                    stage: stage_b.stage,
                    source,
                });
            }
        };

        let mut forwarders = Vec::new();
        if let Some(stderr) = child_a.stderr.take() {
            forwarders.push(forward_lines(stderr, stage_a.stage, logger.clone()));
        }
        if let Some(stderr) = child_b.stderr.take() {
            forwarders.push(forward_lines(stderr, stage_b.stage, logger.clone()));
        }
        if let Some(stdout) = child_b.stdout.take() {
            forwarders.push(forward_lines(stdout, stage_b.stage, logger.clone()));
        }

        let pump = match (child_a.stdout.take(), child_b.stdin.take()) {
            (Some(stdout), Some(stdin)) => Some(pump(stdout, stdin)),
            _ => None,
        };

        Ok(Self {
            stage_a: child_a,
            stage_b: child_b,
            stage_a_done: false,
            stage_b_done: false,
            pump,
            forwarders,
            logger,
        })
    }

    pub fn stage_a_running(&self) -> bool {
        !self.stage_a_done
    }

    /// Prochain événement; `None` quand les deux étapes sont terminées
    pub async fn next_event(&mut self) -> Option<PipeEvent> {
        let to_exit = |status: std::io::Result<ExitStatus>| {
            status.map(StageExit::from).unwrap_or_else(|_| StageExit::killed())
        };

        match (self.stage_a_done, self.stage_b_done) {
            (true, true) => None,
            (false, true) => {
                let exit = to_exit(self.stage_a.wait().await);
                self.stage_a_done = true;
                Some(PipeEvent::StageAExited(exit))
            }
            (true, false) => {
                let exit = to_exit(self.stage_b.wait().await);
                self.stage_b_done = true;
                Some(PipeEvent::StageBExited(exit))
            }
            (false, false) => {
                tokio::select! {
                    status = self.stage_a.wait() => {
                        self.stage_a_done = true;
                        Some(PipeEvent::StageAExited(to_exit(status)))
                    }
                    status = self.stage_b.wait() => {
                        self.stage_b_done = true;
                        Some(PipeEvent::StageBExited(to_exit(status)))
                    }
                }
            }
        }
    }

    /// Tue l'étape A si elle tourne encore
    pub fn terminate_stage_a(&mut self) {
        if self.stage_a_done {
            return;
        }
        if let Err(e) = self.stage_a.start_kill() {
            self.logger
                .warn(&format!("Impossible d'arrêter {}: {}", Stage::BasecallDecoder, e));
        }
    }

    /// Attend la fin du pompage et des journaux de flux
    pub async fn finish(mut self) {
        if let Some(pump) = self.pump.take() {
            match pump.await {
                Ok(Ok(bytes)) => {
                    tracing::debug!(lane = self.logger.lane(), "{} octets transmis à l'étape B", bytes)
                }
                Ok(Err(e)) => self
                    .logger
                    .warn(&format!("Transfert vers {} interrompu: {}", Stage::IndexDecoder, e)),
                Err(_) => {}
            }
        }
        for forwarder in self.forwarders.drain(..) {
            let _ = forwarder.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_stages_succeed() {
        assert!(resolve_lane_result(StageExit::success(), StageExit::success()).is_ok());
    }

    #[test]
    fn test_stage_b_failure_wins() {
        let err = resolve_lane_result(StageExit::killed(), StageExit::failed(3)).unwrap_err();
        assert!(matches!(
            err,
            LaneError::StageFailed {
                stage: Stage::IndexDecoder,
                code: Some(3)
            }
        ));
    }

    #[test]
    fn test_stage_a_failure_surfaces_when_b_succeeds() {
        let err = resolve_lane_result(StageExit::failed(1), StageExit::success()).unwrap_err();
        assert!(matches!(
            err,
            LaneError::StageFailed {
                stage: Stage::BasecallDecoder,
                code: Some(1)
            }
        ));
    }
}
