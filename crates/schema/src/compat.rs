//! Migration compatibility rules
//!
//! A candidate schema may become the next version only if:
//! 1. its key fields match the latest version exactly (names, order, types)
//! 2. every field it shares with the latest version keeps its type and mapping
//! 3. every field it adds, at any nesting depth, declares a default
//! 4. (fields it drops are simply removed)
//! 5. its shape differs from every stored version
//!
//! Types never widen: `int` to `long` is a change like any other.

use tabula_core::{Error, Result};

use crate::entity_schema::{EntitySchema, FieldType};

/// Check `candidate` against the latest stored version and the full history
///
/// `history` yields every stored version, `latest` included.
///
/// # Errors
///
/// Returns `IncompatibleSchema` naming the first rule that failed.
pub fn check_migration<'a>(
    candidate: &EntitySchema,
    latest: &EntitySchema,
    history: impl IntoIterator<Item = &'a EntitySchema>,
) -> Result<()> {
    check_key_shape(candidate, latest)?;

    for field in candidate.fields() {
        match latest.field(&field.name) {
            Some(existing) => {
                if existing.mapping != field.mapping {
                    return Err(Error::incompatible(format!(
                        "field '{}' changed mapping from {} to {}",
                        field.name, existing.mapping, field.mapping
                    )));
                }
                check_type_evolution(&field.name, &existing.field_type, &field.field_type)?;
            }
            None => {
                if field.default.is_none() {
                    return Err(Error::incompatible(format!(
                        "added field '{}' has no default value",
                        field.name
                    )));
                }
            }
        }
    }

    let shape = candidate.shape();
    if let Some(duplicate) = history.into_iter().find(|s| s.shape() == shape) {
        return Err(Error::incompatible(format!(
            "schema is identical to existing version {}",
            duplicate.version()
        )));
    }
    Ok(())
}

fn check_key_shape(candidate: &EntitySchema, latest: &EntitySchema) -> Result<()> {
    let names = |s: &EntitySchema| {
        s.key_fields()
            .iter()
            .map(|k| k.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    };
    if candidate.key_fields().len() != latest.key_fields().len() {
        return Err(Error::incompatible(format!(
            "key fields changed from [{}] to [{}]",
            names(latest),
            names(candidate)
        )));
    }
    for (new, old) in candidate.key_fields().iter().zip(latest.key_fields()) {
        if new.name != old.name {
            return Err(Error::incompatible(format!(
                "key fields changed from [{}] to [{}]",
                names(latest),
                names(candidate)
            )));
        }
        if new.field_type.canonical() != old.field_type.canonical() {
            return Err(Error::incompatible(format!(
                "key field '{}' changed type from {} to {}",
                new.name, old.field_type, new.field_type
            )));
        }
    }
    Ok(())
}

/// Records and arrays evolve structurally; everything else must be unchanged
fn check_type_evolution(path: &str, old: &FieldType, new: &FieldType) -> Result<()> {
    match (old, new) {
        (FieldType::Record(old_record), FieldType::Record(new_record)) => {
            for sub in &new_record.fields {
                let sub_path = format!("{}.{}", path, sub.name);
                match old_record.field(&sub.name) {
                    Some(existing) => {
                        check_type_evolution(&sub_path, &existing.field_type, &sub.field_type)?
                    }
                    None if sub.default.is_none() => {
                        return Err(Error::incompatible(format!(
                            "added field '{}' has no default value",
                            sub_path
                        )))
                    }
                    None => {}
                }
            }
            Ok(())
        }
        (FieldType::Array(old_items), FieldType::Array(new_items)) => {
            check_type_evolution(&format!("{}[]", path), old_items, new_items)
        }
        _ if old.canonical() == new.canonical() => Ok(()),
        _ => Err(Error::incompatible(format!(
            "field '{}' changed type from {} to {}",
            path, old, new
        ))),
    }
}
