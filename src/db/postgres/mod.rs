mod intentions;

pub use intentions::PostgresIntentionRepo;
