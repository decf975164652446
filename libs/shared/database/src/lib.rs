pub mod supabase;
pub mod filters;

pub use supabase::SupabaseClient;
