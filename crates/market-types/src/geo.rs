//! Geographic point type.

use serde::{Deserialize, Serialize};

/// A geographic coordinate pair.
///
/// The canonical internal representation is named latitude/longitude
/// fields, in that order. Wire formats that use `POINT(lon lat)` ordering
/// must convert at the boundary; the ambiguity never enters the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
	pub latitude: f64,
	pub longitude: f64,
}

impl GeoPoint {
	/// Whether both coordinates are finite and within WGS84 bounds.
	pub fn is_valid(&self) -> bool {
		self.latitude.is_finite()
			&& self.longitude.is_finite()
			&& (-90.0..=90.0).contains(&self.latitude)
			&& (-180.0..=180.0).contains(&self.longitude)
	}
}
