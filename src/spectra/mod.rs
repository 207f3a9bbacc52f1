/// Spectra layer: selected points → renderable traces.
///
/// ```text
///   Selection + DataStore
///          │
///          ▼
///   ┌─────────────┐   BackgroundSnapshot (optional)
///   │  aggregate   │◄──────────────────────────┐
///   └─────────────┘                            │
///          │ TraceSet (point + mean traces)    │
///          ├──────────────► plot               │
///          ▼                                   │
///   ┌─────────────┐                            │
///   │ background   │  capture displayed means ─┘
///   └─────────────┘
/// ```

pub mod aggregate;
pub mod background;
pub mod trace;
pub mod transform;
