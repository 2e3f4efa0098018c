// ── Action schemas ──
//
// What `get_services` reports: for every domain, the invocable actions and
// their field descriptions. The field blobs are passed through untouched.

use indexmap::IndexMap;
use serde_json::Value;

/// `action name → field-schema blob` for one domain.
pub type ActionFields = IndexMap<String, Value>;

/// `domain → action name → field-schema blob`, insertion ordered.
pub type ActionSchema = IndexMap<String, ActionFields>;
