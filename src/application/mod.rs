// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, scoring, reporting status).
//
// Rules for this layer:
//   - No ML math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - No HTTP or file formats here (that's Layer 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Backend selection from settings
pub mod services;

// Registration and promotion of model versions
pub mod registrar;

// The tracked training workflow
pub mod train_use_case;

// Scoring with a saved or registered model
pub mod predict_use_case;
