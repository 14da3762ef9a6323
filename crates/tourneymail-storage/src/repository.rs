//! Repository layer for data access

pub mod campaign_records;
pub mod contacts;
pub mod rankings;
pub mod scheduled_campaigns;
pub mod tournaments;

// Repository traits
pub use campaign_records::CampaignRecordRepository;
pub use contacts::ContactRepository;
pub use rankings::RankingRepository;
pub use scheduled_campaigns::ScheduledCampaignRepository;
pub use tournaments::TournamentRepository;

// Database implementations
pub use campaign_records::DbCampaignRecordRepository;
pub use contacts::DbContactRepository;
pub use rankings::DbRankingRepository;
pub use scheduled_campaigns::DbScheduledCampaignRepository;
pub use tournaments::DbTournamentRepository;
