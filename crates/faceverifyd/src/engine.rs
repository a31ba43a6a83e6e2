use faceverify_core::{VerificationResult, Verifier, VerifyError};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("verifier panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from HTTP handlers to the engine thread.
struct VerifyRequest {
    img1: PathBuf,
    img2: PathBuf,
    model_name: String,
    enforce_detection: bool,
    reply: oneshot::Sender<Result<VerificationResult, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<VerifyRequest>,
}

impl EngineHandle {
    /// Queue a verification and wait for its result.
    ///
    /// Both paths must stay on disk until this returns.
    pub async fn verify(
        &self,
        img1: PathBuf,
        img2: PathBuf,
        model_name: &str,
        enforce_detection: bool,
    ) -> Result<VerificationResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(VerifyRequest {
                img1,
                img2,
                model_name: model_name.to_string(),
                enforce_detection,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The verifier owns ONNX sessions that need exclusive access, so every
/// request is served in arrival order by this one thread. A panic inside the
/// verifier fails only the request that caused it. The thread exits once all
/// handles are dropped.
pub fn spawn_engine(
    mut verifier: Box<dyn Verifier>,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<VerifyRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("faceverify-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let started = std::time::Instant::now();
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    verifier.verify(&req.img1, &req.img2, &req.model_name, req.enforce_detection)
                }))
                .map_err(|payload| EngineError::Panicked(panic_message(payload.as_ref())))
                .and_then(|r| r.map_err(EngineError::from));

                match &result {
                    Ok(r) => tracing::info!(
                        verified = r.verified,
                        distance = r.distance,
                        threshold = r.threshold,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "verification complete"
                    ),
                    Err(e) => tracing::warn!(error = %e, "verification failed"),
                }

                // Caller may have gone away (client disconnect)
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct EchoVerifier;

    impl Verifier for EchoVerifier {
        fn verify(
            &mut self,
            img1: &Path,
            img2: &Path,
            model_name: &str,
            _enforce_detection: bool,
        ) -> Result<VerificationResult, VerifyError> {
            if img1 == Path::new("/panic.jpg") {
                panic!("corrupt tensor");
            }
            if model_name != "ArcFace" {
                return Err(VerifyError::UnsupportedModel(model_name.to_string()));
            }
            let distance = if img1 == img2 { 0.0 } else { 1.0 };
            Ok(VerificationResult::decide(distance, 0.68, model_name))
        }
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let engine = spawn_engine(Box::new(EchoVerifier), 2).unwrap();

        let same = engine
            .verify("/a.jpg".into(), "/a.jpg".into(), "ArcFace", false)
            .await
            .unwrap();
        assert!(same.verified);
        assert_eq!(same.distance, 0.0);

        let different = engine
            .verify("/a.jpg".into(), "/b.jpg".into(), "ArcFace", false)
            .await
            .unwrap();
        assert!(!different.verified);
    }

    #[tokio::test]
    async fn test_engine_propagates_verifier_error() {
        let engine = spawn_engine(Box::new(EchoVerifier), 2).unwrap();
        let err = engine
            .verify("/a.jpg".into(), "/a.jpg".into(), "VGG-Face", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Verify(VerifyError::UnsupportedModel(_))));
        assert!(err.to_string().contains("VGG-Face"));
    }

    #[tokio::test]
    async fn test_engine_serves_concurrent_callers() {
        let engine = spawn_engine(Box::new(EchoVerifier), 1).unwrap();
        let calls: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let b = if i % 2 == 0 { "/a.jpg" } else { "/b.jpg" };
                    engine.verify("/a.jpg".into(), b.into(), "ArcFace", false).await
                })
            })
            .collect();

        for (i, call) in calls.into_iter().enumerate() {
            let result = call.await.unwrap().unwrap();
            assert_eq!(result.verified, i % 2 == 0);
        }
    }

    #[tokio::test]
    async fn test_engine_survives_verifier_panic() {
        let engine = spawn_engine(Box::new(EchoVerifier), 2).unwrap();

        let err = engine
            .verify("/panic.jpg".into(), "/a.jpg".into(), "ArcFace", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Panicked(ref msg) if msg == "corrupt tensor"));

        // The thread keeps serving later requests
        let result = engine
            .verify("/a.jpg".into(), "/a.jpg".into(), "ArcFace", false)
            .await
            .unwrap();
        assert!(result.verified);
    }
}
