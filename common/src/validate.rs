use serde_json::Value;
use thiserror::Error;

/// Métricas de tiempo que un reporte debe traer para ser aceptado.
pub const REQUIRED_METRICS: [&str; 3] = ["firstContentfulPaint", "largestContentfulPaint", "interactive"];

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("el reporte no es un objeto JSON")]
    NotAnObject,
    #[error("el reporte trae runtimeError: {0}")]
    RuntimeError(String),
    #[error("faltan métricas en el reporte: {}", .0.join(", "))]
    MissingMetrics(Vec<String>),
}

/// Revisa que el reporte no traiga error de runtime y que tenga todas las
/// métricas de [`REQUIRED_METRICS`] como números.
pub fn validate_report(report: &Value) -> Result<(), ValidationError> {
    let obj = report.as_object().ok_or(ValidationError::NotAnObject)?;

    if let Some(err) = obj.get("runtimeError") {
        let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("");
        if code != "NO_ERROR" {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(code)
                .to_string();
            return Err(ValidationError::RuntimeError(message));
        }
    }

    let metrics = report
        .pointer("/audits/metrics/details/items/0")
        .and_then(|m| m.as_object());

    let missing: Vec<String> = REQUIRED_METRICS
        .iter()
        .filter(|name| {
            metrics
                .and_then(|m| m.get(**name))
                .map(|v| !v.is_number())
                .unwrap_or(true)
        })
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingMetrics(missing))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn valid_report() -> Value {
        json!({
            "requestedUrl": "https://example.com/",
            "audits": {
                "metrics": {
                    "details": {
                        "items": [{
                            "firstContentfulPaint": 812,
                            "largestContentfulPaint": 1430.5,
                            "interactive": 2210
                        }]
                    }
                }
            }
        })
    }

    #[test]
    fn reporte_completo_es_valido() {
        assert_eq!(validate_report(&valid_report()), Ok(()));
    }

    #[test]
    fn runtime_error_no_error_se_ignora() {
        let mut r = valid_report();
        r["runtimeError"] = json!({"code": "NO_ERROR", "message": ""});
        assert_eq!(validate_report(&r), Ok(()));
    }

    #[test]
    fn runtime_error_real_invalida() {
        let mut r = valid_report();
        r["runtimeError"] = json!({"code": "NO_FCP", "message": "The page did not paint"});
        assert_eq!(
            validate_report(&r),
            Err(ValidationError::RuntimeError("The page did not paint".to_string()))
        );
    }

    #[test]
    fn metrica_no_numerica_cuenta_como_faltante() {
        let mut r = valid_report();
        r["audits"]["metrics"]["details"]["items"][0]["interactive"] = json!(null);
        assert_eq!(
            validate_report(&r),
            Err(ValidationError::MissingMetrics(vec!["interactive".to_string()]))
        );
    }

    #[test]
    fn sin_audits_faltan_todas() {
        let err = validate_report(&json!({"lighthouseVersion": "9.6.8"})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingMetrics(REQUIRED_METRICS.iter().map(|s| s.to_string()).collect())
        );
    }

    #[test]
    fn no_objeto_es_invalido() {
        assert_eq!(validate_report(&json!([1, 2])), Err(ValidationError::NotAnObject));
    }
}
