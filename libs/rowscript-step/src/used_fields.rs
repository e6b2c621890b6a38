use rowscript_api::schema::RowSchema;

/// Indices of input fields whose name occurs in the transform script text.
///
/// Two passes: a case-insensitive pass only sizes the result, then a
/// case-sensitive pass over the raw script text produces the list that is
/// kept. Plain substring search, so a field name inside a comment or string
/// literal still counts.
pub fn used_fields(script: &str, schema: &RowSchema) -> Vec<usize> {
    let upper_script = script.to_uppercase();
    let mut capacity = 0;
    for field in &schema.fields {
        if upper_script.contains(&field.name.to_uppercase()) {
            capacity += 1;
        }
    }

    let mut used = Vec::with_capacity(capacity);
    for (i, field) in schema.fields.iter().enumerate() {
        if script.contains(field.name.as_str()) {
            tracing::debug!(index = i, field = %field.name, "field referenced by transform script");
            used.push(i);
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowscript_api::schema::FieldDescriptor;
    use rowscript_api::value::TypeKind;

    fn schema(names: &[&str]) -> RowSchema {
        RowSchema::new(
            names
                .iter()
                .map(|n| FieldDescriptor::new(*n, TypeKind::String))
                .collect(),
        )
    }

    #[test]
    fn keeps_declaration_order() {
        let schema = schema(&["a", "b", "c"]);
        assert_eq!(used_fields("c + a", &schema), vec![0, 2]);
    }

    #[test]
    fn is_idempotent() {
        let schema = schema(&["price", "qty"]);
        let first = used_fields("price * qty", &schema);
        let second = used_fields("price * qty", &schema);
        assert_eq!(first, second);
    }

    #[test]
    fn collection_pass_is_case_sensitive() {
        // The sizing pass would match "PRICE" case-insensitively, but the
        // kept list comes from the exact-case pass.
        let schema = schema(&["price"]);
        assert_eq!(used_fields("PRICE * 2", &schema), Vec::<usize>::new());
        assert_eq!(used_fields("price * 2", &schema), vec![0]);
    }

    #[test]
    fn substring_match_counts_comments_and_identifiers() {
        let schema = schema(&["qty", "t"]);
        assert_eq!(used_fields("// qty is ignored here", &schema), vec![0, 1]);
        // "t" matches as a substring of "total".
        assert_eq!(used_fields("let total = 1;", &schema), vec![1]);
    }

    #[test]
    fn empty_script_uses_nothing() {
        let schema = schema(&["a"]);
        assert!(used_fields("", &schema).is_empty());
    }
}
