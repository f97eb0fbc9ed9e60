pub mod challenge;
pub mod directory;
pub mod issue;
pub mod key;
pub mod probe;
pub mod token;
