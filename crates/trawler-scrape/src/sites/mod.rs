//! Built-in site scrapers.
//!
//! Each site validates the `informations` fields it needs, then fetches
//! the public consultation page for the requested record. Input keys
//! are part of the job contract and match what producers enqueue
//! (`registrationNumber`, `cpf`).

mod coren_rj;
mod coren_sp;
mod esaj_sp;

pub use coren_rj::CorenRj;
pub use coren_sp::{CorenSp, CorenSpCrawler};
pub use esaj_sp::EsajSp;
