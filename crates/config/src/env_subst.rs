//! `${VAR}` and `${VAR:-default}` expansion for raw config text.

/// Expand environment placeholders in `input`.
///
/// Unset variables without a default are left as written, so a later parse
/// error points at the placeholder instead of an empty value.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the remainder verbatim.
            output.push_str(&rest[start..]);
            return output;
        };

        let placeholder = &after[..end];
        let (name, default) = match placeholder.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (placeholder, None),
        };

        match (name.is_empty(), lookup(name), default) {
            (false, Some(value), _) => output.push_str(&value),
            (false, None, Some(default)) => output.push_str(default),
            _ => output.push_str(&rest[start..start + 2 + end + 1]),
        }

        rest = &after[end + 1..];
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "COURIER_APP" => Some("billing".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("name = \"${COURIER_APP}\"", lookup),
            "name = \"billing\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${COURIER_NONEXISTENT_XYZ}", lookup),
            "${COURIER_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(
            substitute_env_with("${COURIER_MISSING:-orders}/${COURIER_APP:-x}", lookup),
            "orders/billing"
        );
    }

    #[test]
    fn keeps_malformed_placeholders() {
        assert_eq!(substitute_env_with("a ${} b", lookup), "a ${} b");
        assert_eq!(substitute_env_with("tail ${COURIER_APP", lookup), "tail ${COURIER_APP");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
