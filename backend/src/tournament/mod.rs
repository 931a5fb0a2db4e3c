mod context;
pub mod entry_fee;
mod lifecycle;
pub mod manager;
pub mod prizes;
mod registration;
mod results;

pub use lifecycle::{FORMATS, GAMES, MODES};
pub use manager::{
    LinkUpdate, PlayerRegistration, PrizeRelease, ResultDeclaration, StatusUpdate,
    TournamentConfig, TournamentFilter, TournamentManager,
};
pub use prizes::{PrizeDistribution, WinnerSelectionMode};
