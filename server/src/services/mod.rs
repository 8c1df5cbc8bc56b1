pub mod record_evictor;
