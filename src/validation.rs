//! Input validation for configuration values and command-line arguments

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}

/// Validate chunk duration in milliseconds (10ms to 1000ms)
pub fn validate_chunk_ms(chunk_ms: u32) -> Result<u32, ValidationError> {
    if !(10..=1000).contains(&chunk_ms) {
        return Err(ValidationError::InvalidRange(format!(
            "Chunk duration must be between 10ms and 1000ms, got {}ms",
            chunk_ms
        )));
    }
    Ok(chunk_ms)
}

/// Validate meter bar width in terminal cells (10 to 200)
pub fn validate_bar_width(width: u16) -> Result<u16, ValidationError> {
    if !(10..=200).contains(&width) {
        return Err(ValidationError::InvalidRange(format!(
            "Bar width must be between 10 and 200 cells, got {}",
            width
        )));
    }
    Ok(width)
}

/// Validate render interval in milliseconds (0 to 1000ms, 0 renders every chunk)
pub fn validate_render_interval_ms(interval_ms: u32) -> Result<u32, ValidationError> {
    if interval_ms > 1000 {
        return Err(ValidationError::InvalidRange(format!(
            "Render interval must be at most 1000ms, got {}ms",
            interval_ms
        )));
    }
    Ok(interval_ms)
}

/// Validate tone frequency in Hz (40Hz to 8000Hz, the 16 kHz Nyquist limit)
pub fn validate_frequency_hz(frequency: f32) -> Result<f32, ValidationError> {
    if !(40.0..=8000.0).contains(&frequency) {
        return Err(ValidationError::InvalidRange(format!(
            "Frequency must be between 40Hz and 8000Hz, got {}Hz",
            frequency
        )));
    }
    Ok(frequency)
}

/// Validate tone amplitude (0.0 to 1.0 of full scale)
pub fn validate_amplitude(amplitude: f32) -> Result<f32, ValidationError> {
    if !(0.0..=1.0).contains(&amplitude) {
        return Err(ValidationError::InvalidRange(format!(
            "Amplitude must be between 0.0 and 1.0, got {}",
            amplitude
        )));
    }
    Ok(amplitude)
}

/// Validate tone duration in milliseconds (10ms to one hour)
pub fn validate_duration_ms(duration_ms: u32) -> Result<u32, ValidationError> {
    if !(10..=3_600_000).contains(&duration_ms) {
        return Err(ValidationError::InvalidRange(format!(
            "Duration must be between 10ms and 3600000ms, got {}ms",
            duration_ms
        )));
    }
    Ok(duration_ms)
}

/// Validate device name (max 256 chars, no control characters)
pub fn validate_device_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Device name cannot be empty".to_string(),
        ));
    }

    if name.len() > 256 {
        return Err(ValidationError::ValueTooLong {
            max: 256,
            actual: name.len(),
        });
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(
            "Device name contains invalid control characters".to_string(),
        ));
    }

    Ok(name.to_string())
}

/// Validate optional device name (None is valid)
pub fn validate_opt_device_name(name: &Option<String>) -> Result<(), ValidationError> {
    if let Some(n) = name {
        validate_device_name(n)?;
    }
    Ok(())
}

/// Validate a WAV file path: must exist, be a file, and carry a .wav extension
pub fn validate_wav_path(path: &Path) -> Result<(), ValidationError> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if !is_wav {
        return Err(ValidationError::InvalidPath(format!(
            "{} is not a .wav file",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ValidationError::InvalidPath(format!(
            "{} does not exist or is not a file",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ms_valid() {
        assert!(validate_chunk_ms(10).is_ok());
        assert!(validate_chunk_ms(100).is_ok());
        assert!(validate_chunk_ms(1000).is_ok());
    }

    #[test]
    fn test_chunk_ms_invalid() {
        assert!(validate_chunk_ms(0).is_err());
        assert!(validate_chunk_ms(9).is_err());
        assert!(validate_chunk_ms(1001).is_err());
    }

    #[test]
    fn test_bar_width() {
        assert!(validate_bar_width(10).is_ok());
        assert!(validate_bar_width(200).is_ok());
        assert!(validate_bar_width(9).is_err());
        assert!(validate_bar_width(201).is_err());
    }

    #[test]
    fn test_render_interval() {
        assert!(validate_render_interval_ms(0).is_ok());
        assert!(validate_render_interval_ms(1000).is_ok());
        assert!(validate_render_interval_ms(1001).is_err());
    }

    #[test]
    fn test_device_name_valid() {
        assert!(validate_device_name("USB Microphone").is_ok());
        assert!(validate_device_name("Built-in Audio (Analog)").is_ok());
    }

    #[test]
    fn test_device_name_invalid() {
        assert!(validate_device_name("").is_err());
        assert!(validate_device_name("test\x00name").is_err());
        assert_eq!(
            validate_device_name(&"a".repeat(257)),
            Err(ValidationError::ValueTooLong {
                max: 256,
                actual: 257
            })
        );
    }

    #[test]
    fn test_opt_device_name() {
        assert!(validate_opt_device_name(&None).is_ok());
        assert!(validate_opt_device_name(&Some("USB Mic".to_string())).is_ok());
        assert!(validate_opt_device_name(&Some("".to_string())).is_err());
    }

    #[test]
    fn test_wav_path() {
        assert!(validate_wav_path(Path::new("/nonexistent/take.wav")).is_err());
        assert!(validate_wav_path(Path::new("notes.txt")).is_err());

        let path = std::env::temp_dir().join(format!("sound-meter-{}-valid.WAV", std::process::id()));
        std::fs::write(&path, b"RIFF").unwrap();
        assert!(validate_wav_path(&path).is_ok());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_error_messages() {
        let err = validate_amplitude(1.5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid range: Amplitude must be between 0.0 and 1.0, got 1.5"
        );
    }
}
