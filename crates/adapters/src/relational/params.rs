//! Named-placeholder translation.
//!
//! Callers write `:name` placeholders; Postgres wants `$1`-style positionals.
//! The translation is a single scan that ignores `::type` casts and string
//! literals, and reuses one positional slot when the same name appears twice.

/// Translate `:name` placeholders to `$n`, returning the rewritten SQL and
/// the parameter names in positional order.
pub fn translate_named_params(query: &str) -> (String, Vec<String>) {
    let mut sql = String::with_capacity(query.len());
    let mut names: Vec<String> = Vec::new();
    let bytes = query.as_bytes();
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\'' {
            in_string = !in_string;
            sql.push(c);
            i += 1;
            continue;
        }
        if in_string || c != ':' {
            sql.push(c);
            i += 1;
            continue;
        }
        // A `::` cast, or a colon at the end of input: keep verbatim.
        if i + 1 >= bytes.len() || bytes[i + 1] == b':' {
            let end = (i + 2).min(bytes.len());
            sql.push_str(&query[i..end]);
            i = end;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        if end == start {
            sql.push(c);
            i += 1;
            continue;
        }
        let name = &query[start..end];
        let position = match names.iter().position(|n| n == name) {
            Some(p) => p + 1,
            None => {
                names.push(name.to_string());
                names.len()
            }
        };
        sql.push('$');
        sql.push_str(&position.to_string());
        i = end;
    }

    (sql, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_in_order() {
        let (sql, names) = translate_named_params(
            "INSERT INTO projects (id, name) VALUES (:id, :name)",
        );
        assert_eq!(sql, "INSERT INTO projects (id, name) VALUES ($1, $2)");
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn repeated_name_reuses_slot() {
        let (sql, names) =
            translate_named_params("SELECT * FROM t WHERE a = :v OR b = :v OR c = :w");
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 OR b = $1 OR c = $2");
        assert_eq!(names, vec!["v", "w"]);
    }

    #[test]
    fn ignores_casts_and_string_literals() {
        let (sql, names) =
            translate_named_params("SELECT :id::uuid, ':not_a_param' FROM t WHERE x = :id");
        assert_eq!(sql, "SELECT $1::uuid, ':not_a_param' FROM t WHERE x = $1");
        assert_eq!(names, vec!["id"]);
    }

    #[test]
    fn no_placeholders_is_a_no_op() {
        let (sql, names) = translate_named_params("SELECT 1");
        assert_eq!(sql, "SELECT 1");
        assert!(names.is_empty());
    }
}
