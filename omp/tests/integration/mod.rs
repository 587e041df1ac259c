mod buyflow_destroy;
mod buyflow_refund;
mod buyflow_release;
mod error_cases;
mod resume;
mod tampering;
mod wire_messages;
