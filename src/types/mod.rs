//! Request and response types shared by the router, dispatcher, and HTTP surface.

pub mod limits;
pub mod request;
pub mod response;

pub use limits::RequestLimits;
pub use request::{
    DEFAULT_MAX_LENGTH, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
    GenerateRequest, PreparedRequest,
};
pub use response::{GenerateResponse, GenerationSource, NO_RESULT_TEXT};
