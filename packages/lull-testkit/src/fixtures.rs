//! Recordings shared by the suites that run against real stores.

use uuid::Uuid;

pub const FEATURE_DIM: usize = 4;

/// A catalogued cry: the raw features of its recording and the label a parent confirmed.
#[derive(Debug, Clone, Copy)]
pub struct CataloguedCry {
	pub features: [f32; FEATURE_DIM],
	pub label: &'static str,
}

/// Two hungry cries and a tired one close to [`NEW_CRY`], then two gassy cries far from it.
pub const CATALOGUE: [CataloguedCry; 5] = [
	CataloguedCry { features: [1.0, 0.9, 0.0, 0.1], label: "hungry" },
	CataloguedCry { features: [0.9, 1.0, 0.1, 0.0], label: "hungry" },
	CataloguedCry { features: [0.8, 0.8, 0.0, 0.0], label: "tired" },
	CataloguedCry { features: [-1.0, -1.0, 1.0, 0.0], label: "gassy" },
	CataloguedCry { features: [-1.0, -1.0, 0.0, 1.0], label: "gassy" },
];

/// Its three nearest catalogue entries are the first three, and the tired cry ranks first.
pub const NEW_CRY: [f32; FEATURE_DIM] = [1.0, 1.0, 0.0, 0.0];

pub fn audio_ref(owner_id: &str, item_id: Uuid) -> String {
	format!("file:///{owner_id}/{item_id}.wav")
}

/// An owner id no other run shares, for suites that reuse one database.
pub fn unique_owner(tag: &str) -> String {
	format!("{tag}-{}", Uuid::new_v4().simple())
}
