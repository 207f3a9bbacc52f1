/// Data layer: instrument files in, canonical records out.
///
/// Architecture:
/// ```text
///  .3ds / .dat / .sxm bytes
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  extension → nanonis adapter → flat key/value record
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  schema   │  normalize into CanonicalRecord, reject unknown keys
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  store    │  append-only DataStore, file index = upload order
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ selection  │  click / box payloads → (file, point) selection
///   └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod nanonis;
pub mod schema;
pub mod selection;
pub mod store;
