use anyhow::Result;
use log::debug;

use crate::compat::ClientCompatibility;
use crate::protocol::{SearchQuery, UpdatesQuery};
use crate::service::FeedService;

use super::print_records;

/// List every package visible at `compatibility`.
#[tracing::instrument(skip(service))]
pub fn list(service: &FeedService, compatibility: ClientCompatibility, json: bool) -> Result<()> {
    let records = service.get_packages(compatibility);
    debug!("Listing {} package(s)", records.len());
    print_records(&records, compatibility, json)
}

/// Search the feed.
#[tracing::instrument(skip(service))]
pub fn search(
    service: &FeedService,
    query: &SearchQuery,
    compatibility: ClientCompatibility,
    json: bool,
) -> Result<()> {
    let records = service.search(query, compatibility);
    print_records(&records, compatibility, json)
}

/// List the listed versions of one package.
#[tracing::instrument(skip(service))]
pub fn find(
    service: &FeedService,
    id: &str,
    compatibility: ClientCompatibility,
    json: bool,
) -> Result<()> {
    let records = service.find_packages_by_id(id, compatibility);
    print_records(&records, compatibility, json)
}

/// Show available updates for installed packages.
#[tracing::instrument(skip(service))]
pub fn updates(
    service: &FeedService,
    query: &UpdatesQuery,
    compatibility: ClientCompatibility,
    json: bool,
) -> Result<()> {
    let records = service.get_updates(query, compatibility);
    debug!("{} update(s) available", records.len());
    print_records(&records, compatibility, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{archive, feed};
    use crate::settings::FeedSettings;

    #[test]
    fn test_browse_commands() {
        let (_dir, service) = feed(FeedSettings::default());
        service.publish(&archive("Foo", "1.0.0")).unwrap();
        service.publish(&archive("Foo", "1.1.0")).unwrap();

        let legacy = ClientCompatibility::Legacy;
        assert!(list(&service, legacy, false).is_ok());
        assert!(list(&service, ClientCompatibility::Delisting, true).is_ok());
        assert!(find(&service, "foo", legacy, true).is_ok());

        let query = SearchQuery::from_wire(Some("foo"), "", false, false);
        assert!(search(&service, &query, legacy, false).is_ok());

        let query = UpdatesQuery::from_wire("Foo", "1.0.0", false, false, "", "");
        assert!(updates(&service, &query, legacy, true).is_ok());
    }

    #[test]
    fn test_browse_empty_feed() {
        let (_dir, service) = feed(FeedSettings::default());
        assert!(list(&service, ClientCompatibility::Legacy, false).is_ok());
    }
}
