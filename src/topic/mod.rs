//! Topic matching
//!
//! Subscribers register patterns; every published topic is checked against
//! each connected subscriber's pattern set. Wildcards:
//! - `+` matches one or more characters excluding `/`
//! - `*` matches zero or more characters of any kind, `/` included
//!
//! Wildcards need not occupy a whole level: `sensor+` matches `sensorA`
//! but not `sensor/A`. Every other character is literal.

mod matcher;
pub mod validation;


pub use matcher::{find_any_match, topic_matches, TopicPattern, ANY, ONE_OR_MORE, SEPARATOR};
pub use validation::{validate_pattern, validate_topic};
