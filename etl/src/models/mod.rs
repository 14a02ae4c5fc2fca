mod neo;
mod rows;

pub use neo::{
    CloseApproach, DiameterRange, EstimatedDiameter, FeedResponse, MissDistance,
    NearEarthObject, RelativeVelocity,
};
pub use rows::{RawAsteroid, RawCloseApproach};
