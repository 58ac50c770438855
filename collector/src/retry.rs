use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

/// Repite `op` hasta que devuelva `Ok`, sin límite de intentos.
///
/// `is_transient` decide qué errores se reintentan; el primer error no
/// transitorio se devuelve tal cual. `op` recibe el número de intento (1..).
pub async fn retry_forever<T, E, F, Fut, C>(what: &str, is_transient: C, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt: u32 = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: ok en el intento {}", what, attempt);
                }
                return Ok(value);
            }
            Err(e) if is_transient(&e) => {
                warn!("{}: intento {} falló ({}), reintentando", what, attempt, e);
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                warn!("{}: error fatal en el intento {}: {}", what, attempt, e);
                return Err(e);
            }
        }
    }
}
