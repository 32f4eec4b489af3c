pub mod byte_queue;
pub mod line_reader;
pub mod readable_wait;
