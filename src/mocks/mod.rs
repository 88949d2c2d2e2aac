pub mod mock_location;
pub mod mock_orientation;

pub use mock_location::MockLocation;
pub use mock_orientation::MockOrientation;
