mod checksum;
mod header;
pub(crate) mod message;
mod query;
mod util;

pub(crate) use self::{
    message::{DocumentSequence, Message, MessageFlags},
    query::Query,
    util::next_request_id,
};
