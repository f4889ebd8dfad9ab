//! Placeholder substitution for SQL bodies.
//!
//! The token set is closed: `${PROJECT}` and `${DATASET}`. Any other `${...}`
//! sequence is left verbatim.

use crate::target::Target;

pub const PROJECT_TOKEN: &str = "${PROJECT}";
pub const DATASET_TOKEN: &str = "${DATASET}";

/// Replace every recognised placeholder in `sql` with the target's values.
///
/// Idempotent: [`Target`] identifiers cannot contain `$`, `{` or `}`, so the
/// output never contains a recognised token.
pub fn substitute(sql: &str, target: &Target) -> String {
  sql
    .replace(PROJECT_TOKEN, &target.project)
    .replace(DATASET_TOKEN, &target.dataset)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target() -> Target { Target::new("my-project", "my_dataset", "US").unwrap() }

  #[test]
  fn replaces_both_tokens() {
    let sql = "CREATE TABLE `${PROJECT}.${DATASET}.orders` (id STRING);";
    assert_eq!(
      substitute(sql, &target()),
      "CREATE TABLE `my-project.my_dataset.orders` (id STRING);"
    );
  }

  #[test]
  fn replaces_every_occurrence() {
    assert_eq!(
      substitute("${PROJECT} and ${PROJECT}", &target()),
      "my-project and my-project"
    );
  }

  #[test]
  fn text_without_tokens_is_unchanged() {
    assert_eq!(substitute("SELECT 1", &target()), "SELECT 1");
  }

  #[test]
  fn unknown_tokens_are_left_verbatim() {
    let sql = "SELECT '${REGION}', '${project}' FROM `${DATASET}.t`";
    assert_eq!(
      substitute(sql, &target()),
      "SELECT '${REGION}', '${project}' FROM `my_dataset.t`"
    );
  }

  #[test]
  fn substitution_is_idempotent() {
    let sql = "MERGE `${PROJECT}.${DATASET}.a` USING `${OTHER}.b` ON TRUE";
    let once = substitute(sql, &target());
    assert_eq!(substitute(&once, &target()), once);
  }
}
