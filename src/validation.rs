use crate::error::GameError;

pub const MAX_NAME_LEN: usize = 20;
pub const MAX_ROOM_NAME_LEN: usize = 30;

pub fn display_name(raw: &str) -> Result<String, GameError> {
    bounded(raw, MAX_NAME_LEN, "Name")
}

pub fn room_name(raw: &str) -> Result<String, GameError> {
    bounded(raw, MAX_ROOM_NAME_LEN, "Room name")
}

/// Room codes are matched case-insensitively.
pub fn room_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Trims the three statements and checks the lie marker points at one of them.
pub fn statements(raw: &[String], lie_index: usize) -> Result<[String; 3], GameError> {
    let [a, b, c] = raw else {
        return Err(GameError::InvalidInput(
            "Exactly three statements are required".to_string(),
        ));
    };
    let trimmed = [a, b, c].map(|s| s.trim().to_string());
    if trimmed.iter().any(String::is_empty) {
        return Err(GameError::InvalidInput(
            "Statements cannot be empty".to_string(),
        ));
    }
    choice(lie_index)?;
    Ok(trimmed)
}

pub fn choice(index: usize) -> Result<usize, GameError> {
    if index < 3 {
        Ok(index)
    } else {
        Err(GameError::InvalidInput(format!(
            "Choice {index} is out of range"
        )))
    }
}

fn bounded(raw: &str, max: usize, what: &str) -> Result<String, GameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GameError::InvalidInput(format!("{what} cannot be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(GameError::InvalidInput(format!(
            "{what} must be at most {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(display_name("  ana ").unwrap(), "ana");
        assert!(display_name("   ").is_err());
        assert!(display_name(&"x".repeat(21)).is_err());
        assert!(room_name(&"r".repeat(30)).is_ok());
        assert!(room_name(&"r".repeat(31)).is_err());
    }

    #[test]
    fn room_codes_ignore_case_and_padding() {
        assert_eq!(room_code(" ab12cd\n"), "AB12CD");
    }

    #[test]
    fn statements_need_three_non_empty() {
        let two = vec!["a".to_string(), "b".to_string()];
        assert!(statements(&two, 0).is_err());

        let blank = vec!["a".to_string(), " ".to_string(), "c".to_string()];
        assert!(statements(&blank, 0).is_err());

        let ok = vec![" a".to_string(), "b ".to_string(), "c".to_string()];
        assert_eq!(statements(&ok, 2).unwrap(), ["a", "b", "c"].map(String::from));
        assert!(statements(&ok, 3).is_err());
    }
}
