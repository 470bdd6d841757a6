use synth_core::{Action, DurationUpdate, Label};

use crate::error::ApiError;

/// Maximum number of labels accepted in one request
pub const MAX_LABELS_PER_REQUEST: usize = 2000;
/// Maximum length of a single label line
const MAX_LABEL_LENGTH: usize = 2048;
/// Upper bound for the speed factor
const MAX_SPEED: f64 = 10.0;
/// Upper bound for the output volume
const MAX_VOLUME: f64 = 10.0;

/// Validate and parse a batch of label lines
pub fn validate_label_lines(lines: &str) -> Result<Vec<Label>, ApiError> {
    if lines.trim().is_empty() {
        return Err(ApiError::InvalidInput("Labels cannot be empty".to_string()));
    }
    if let Some(line) = lines.lines().find(|l| l.len() > MAX_LABEL_LENGTH) {
        return Err(ApiError::InvalidInput(format!(
            "Label too long (max {} characters): {}...",
            MAX_LABEL_LENGTH,
            line.chars().take(32).collect::<String>()
        )));
    }

    let labels = Label::parse_lines(lines)?;
    if labels.len() > MAX_LABELS_PER_REQUEST {
        return Err(ApiError::InvalidInput(format!(
            "Too many labels (max {} per request)",
            MAX_LABELS_PER_REQUEST
        )));
    }
    Ok(labels)
}

/// Validate a speed factor
pub fn validate_speed(speed: f64) -> Result<(), ApiError> {
    if !speed.is_finite() || speed <= 0.0 || speed > MAX_SPEED {
        return Err(ApiError::InvalidInput(format!(
            "Speed must be in (0, {}], got {}",
            MAX_SPEED, speed
        )));
    }
    Ok(())
}

/// Validate vocoder and scheduler controls; `None` fields are left unchanged
pub fn validate_controls(
    pitch: Option<f64>,
    alpha: Option<f64>,
    gamma: Option<f64>,
    volume: Option<f64>,
    speed: Option<f64>,
) -> Result<(), ApiError> {
    if let Some(pitch) = pitch {
        if !pitch.is_finite() {
            return Err(ApiError::InvalidInput("Pitch must be finite".to_string()));
        }
    }
    if let Some(alpha) = alpha {
        if !alpha.is_finite() || alpha.abs() >= 1.0 {
            return Err(ApiError::InvalidInput(format!(
                "Alpha must be in (-1, 1), got {}",
                alpha
            )));
        }
    }
    if let Some(gamma) = gamma {
        if !gamma.is_finite() || !(-1.0..=0.0).contains(&gamma) {
            return Err(ApiError::InvalidInput(format!(
                "Gamma must be in [-1, 0], got {}",
                gamma
            )));
        }
    }
    if let Some(volume) = volume {
        if !volume.is_finite() || !(0.0..=MAX_VOLUME).contains(&volume) {
            return Err(ApiError::InvalidInput(format!(
                "Volume must be in [0, {}], got {}",
                MAX_VOLUME, volume
            )));
        }
    }
    if let Some(speed) = speed {
        validate_speed(speed)?;
    }
    Ok(())
}

/// Validate a per-state duration profile
pub fn validate_duration_update(update: &DurationUpdate) -> Result<(), ApiError> {
    if update.values.is_empty() {
        return Err(ApiError::InvalidInput(
            "Duration update needs at least one value".to_string(),
        ));
    }
    if update.values.iter().any(|v| !v.is_finite()) {
        return Err(ApiError::InvalidInput(
            "Duration values must be finite".to_string(),
        ));
    }
    if matches!(update.action, Action::Overwrite | Action::Scale)
        && update.values.iter().any(|&v| v < 0.0)
    {
        return Err(ApiError::InvalidInput(
            "Overwrite and scale durations cannot be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label_lines_valid() {
        let labels = validate_label_lines("a^b-c+d\n\n0 50000 b^c-d+e\n").unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1].query, "b^c-d+e");
    }

    #[test]
    fn test_validate_label_lines_empty() {
        let result = validate_label_lines("  \n ");
        assert!(result.is_err());
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("empty"));
        }
    }

    #[test]
    fn test_validate_label_lines_too_long() {
        let long = "a".repeat(MAX_LABEL_LENGTH + 1);
        assert!(validate_label_lines(&long).is_err());
    }

    #[test]
    fn test_validate_label_lines_too_many() {
        let lines = "x\n".repeat(MAX_LABELS_PER_REQUEST + 1);
        assert!(validate_label_lines(&lines).is_err());
    }

    #[test]
    fn test_validate_label_lines_malformed() {
        assert!(matches!(
            validate_label_lines("a b"),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_controls() {
        assert!(validate_controls(Some(120.0), Some(0.42), Some(0.0), Some(1.0), Some(1.5)).is_ok());
        assert!(validate_controls(None, None, None, None, None).is_ok());
        assert!(validate_controls(Some(f64::NAN), None, None, None, None).is_err());
        assert!(validate_controls(None, Some(1.0), None, None, None).is_err());
        assert!(validate_controls(None, None, Some(0.5), None, None).is_err());
        assert!(validate_controls(None, None, None, Some(-1.0), None).is_err());
        assert!(validate_controls(None, None, None, None, Some(0.0)).is_err());
    }

    #[test]
    fn test_validate_duration_update() {
        let ok = DurationUpdate {
            values: vec![2.0, 3.0],
            action: Action::Scale,
        };
        assert!(validate_duration_update(&ok).is_ok());

        let negative = DurationUpdate {
            values: vec![-1.0],
            action: Action::Overwrite,
        };
        assert!(validate_duration_update(&negative).is_err());

        let shift = DurationUpdate {
            values: vec![-1.0],
            action: Action::Shift,
        };
        assert!(validate_duration_update(&shift).is_ok());
    }
}
