use validator::ValidationErrors;

/// Normalizes pagination query values. Pages are 1-based and the limit is
/// clamped to `1..=max_limit`.
pub fn clamp_pagination(page: u64, limit: u64, max_limit: u64) -> (u64, u64) {
    let page = page.max(1);
    let limit = limit.clamp(1, max_limit.max(1));
    (page, limit)
}

/// Number of pages needed for `total` rows at `limit` rows per page
pub fn total_pages(total: u64, limit: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

/// Flattens derive-level validation errors into `field: message` strings
/// for the response envelope.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, field_errors)| {
            let field = field.to_string();
            field_errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Invalid value".to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "Name must not be empty"))]
        name: String,
    }

    #[test]
    fn pagination_is_clamped_to_sane_bounds() {
        assert_eq!(clamp_pagination(0, 0, 100), (1, 1));
        assert_eq!(clamp_pagination(3, 20, 100), (3, 20));
        assert_eq!(clamp_pagination(1, 500, 100), (1, 100));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }

    #[test]
    fn validation_messages_name_the_field() {
        let probe = Probe {
            name: String::new(),
        };
        let errors = probe.validate().unwrap_err();
        let messages = validation_messages(&errors);
        assert_eq!(messages, vec!["name: Name must not be empty".to_string()]);
    }
}
