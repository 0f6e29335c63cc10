use async_recursion::async_recursion;
use std::net::{IpAddr, Ipv4Addr};
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::cache::QueryKey;
use crate::classify::{classify, Classification, Referral};
use crate::context::Context;
use crate::transport::TransportError;
use crate::Resolver;

impl Resolver {
    /// Iterative DNS resolution of a single question, without
    /// following CNAMEs.
    ///
    /// The candidates are nameservers for `zone`.  They are tried in
    /// order (duplicates and non-IPv4 addresses are skipped) until one
    /// of them gives an answer, a negative response, or a dead end:
    /// that response is cached and returned.  A referral is followed by
    /// recursing with the new nameservers, resolving their addresses
    /// first if the referral came without glue.  If following a
    /// referral fails, the next candidate is tried.
    ///
    /// A referral is only followed if its zone encloses `name` and is
    /// below `zone`.  Anything else is treated like a failed query.
    ///
    /// Returns `None` if every candidate fails, or if the recursion
    /// limit is hit.
    #[async_recursion]
    pub async fn resolve(
        &self,
        ctx: &mut Context,
        recursion_limit: usize,
        name: &DomainName,
        rtype: RecordType,
        zone: &DomainName,
        candidates: &[IpAddr],
    ) -> Option<Message> {
        if recursion_limit == 0 {
            tracing::debug!("hit recursion limit");
            return None;
        }

        let key = QueryKey::new(name.clone(), rtype);
        if let Some(response) = self.cache.get_answer(&key) {
            tracing::trace!("cache hit");
            ctx.metrics().cache_hit();
            return Some(response);
        }
        ctx.metrics().cache_miss();

        for address in ipv4_candidates(candidates) {
            let Some(response) = self
                .query_nameserver(ctx, address, name, rtype)
                .instrument(tracing::error_span!("query_nameserver", %address))
                .await
            else {
                continue;
            };

            match classify(&response) {
                Classification::Referral(referral) if !referral.gets_closer(zone, name) => {
                    tracing::debug!(
                        %address,
                        referral_zone = %referral.zone,
                        "ignoring referral which does not get closer"
                    );
                }
                Classification::Referral(referral) => {
                    if let Some(response) = self
                        .follow_referral(ctx, recursion_limit, name, rtype, referral)
                        .await
                    {
                        return Some(response);
                    }
                    tracing::trace!(%address, "referral was a dead end - trying next nameserver");
                }
                classification => {
                    tracing::trace!(?classification, %address, "got final response");
                    self.cache.insert_answer(key, response.clone());
                    return Some(response);
                }
            }
        }

        tracing::trace!("out of candidates");
        None
    }

    /// Find addresses for the delegated nameservers (from the glue if
    /// there is any), remember them, and carry on resolving with them.
    async fn follow_referral(
        &self,
        ctx: &mut Context,
        recursion_limit: usize,
        name: &DomainName,
        rtype: RecordType,
        referral: Referral,
    ) -> Option<Message> {
        let Referral {
            zone,
            nameservers,
            glue,
        } = referral;

        let addresses = if glue.is_empty() {
            tracing::trace!(%zone, nameservers = %nameservers.len(), "got glueless referral");
            self.resolve_nameservers(ctx, recursion_limit, &nameservers)
                .await
        } else {
            tracing::trace!(%zone, glue = %glue.len(), "got referral");
            glue
        };

        if addresses.is_empty() {
            tracing::debug!(%zone, "no nameserver addresses for referral");
            return None;
        }

        self.cache.insert_delegation(zone.clone(), &addresses);

        let candidates = addresses.into_iter().map(IpAddr::V4).collect::<Vec<_>>();
        self.resolve(ctx, recursion_limit - 1, name, rtype, &zone, &candidates)
            .instrument(tracing::error_span!("follow_referral", %zone))
            .await
    }

    /// Resolve nameserver names to addresses, starting from the root
    /// hints, until enough addresses have been found.
    ///
    /// A name whose address is already being looked up further up the
    /// stack is skipped: resolving it again would never finish.
    async fn resolve_nameservers(
        &self,
        ctx: &mut Context,
        recursion_limit: usize,
        nameservers: &[DomainName],
    ) -> Vec<Ipv4Addr> {
        let mut addresses = Vec::new();

        for nameserver in nameservers {
            let key = QueryKey::new(nameserver.clone(), RecordType::A);
            if !ctx.start_resolving(key.clone()) {
                tracing::debug!(%nameserver, "already resolving nameserver - skipping");
                continue;
            }

            let response = self
                .resolve(
                    ctx,
                    recursion_limit - 1,
                    nameserver,
                    RecordType::A,
                    &DomainName::root_domain(),
                    &self.config.root_hints,
                )
                .instrument(tracing::error_span!("resolve_nameserver", %nameserver))
                .await;

            ctx.stop_resolving(&key);

            if let Some(response) = response {
                for rr in &response.answers {
                    if let RecordTypeWithData::A { address } = rr.rtype_with_data {
                        addresses.push(address);
                    }
                }
            }

            if addresses.len() >= self.config.glueless_address_limit {
                break;
            }
        }

        addresses
    }

    /// Query a remote nameserver to answer a question.
    ///
    /// This does a non-recursive query, so that we can cache
    /// intermediate results.
    async fn query_nameserver(
        &self,
        ctx: &mut Context,
        address: Ipv4Addr,
        name: &DomainName,
        rtype: RecordType,
    ) -> Option<Message> {
        let request = Message::from_question(rand::random(), Question::new(name.clone(), rtype));

        tracing::trace!("querying nameserver");

        match self
            .transport
            .send(address, &request, self.config.timeout)
            .await
        {
            Ok(response) => {
                ctx.metrics().nameserver_hit();
                Some(response)
            }
            Err(TransportError::Timeout) => {
                tracing::debug!("timed out");
                ctx.metrics().nameserver_timeout();
                None
            }
            Err(error) => {
                tracing::debug!(%error, "query failed");
                ctx.metrics().nameserver_miss();
                None
            }
        }
    }
}

/// The IPv4 addresses, in order, without duplicates.
fn ipv4_candidates(candidates: &[IpAddr]) -> Vec<Ipv4Addr> {
    let mut addresses = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match candidate {
            IpAddr::V4(address) => {
                if !addresses.contains(address) {
                    addresses.push(*address);
                }
            }
            IpAddr::V6(address) => tracing::trace!(%address, "skipping IPv6 nameserver"),
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;
    use std::net::Ipv6Addr;
    use std::sync::Arc;

    use super::*;
    use crate::test_util::*;
    use crate::RECURSION_LIMIT;

    const X: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const Y: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

    async fn resolve_from(
        resolver: &Resolver,
        name: &str,
        rtype: RecordType,
        candidates: &[IpAddr],
    ) -> (Context, Option<Message>) {
        let mut ctx = Context::new();
        let response = resolver
            .resolve(
                &mut ctx,
                RECURSION_LIMIT,
                &domain(name),
                rtype,
                &DomainName::root_domain(),
                candidates,
            )
            .await;
        (ctx, response)
    }

    fn www_a() -> ResourceRecord {
        a_record("www.example.com.", Ipv4Addr::new(1, 2, 3, 4))
    }

    #[test]
    fn ipv4_candidates_skips_ipv6_and_duplicates() {
        assert_eq!(
            vec![X, Y],
            ipv4_candidates(&[
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(X),
                IpAddr::V4(Y),
                IpAddr::V4(X),
            ])
        );
    }

    #[tokio::test]
    async fn returns_answer() {
        let stub = Arc::new(StubTransport::new().answer(
            TEST_ROOT,
            "www.example.com.",
            RecordType::A,
            vec![www_a()],
        ));
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert!(ctx.is_idle());
        let metrics = ctx.done();
        assert_eq!(1, metrics.cache_misses);
        assert_eq!(1, metrics.nameserver_hits);
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let stub = Arc::new(StubTransport::new().answer(
            TEST_ROOT,
            "www.example.com.",
            RecordType::A,
            vec![www_a()],
        ));
        let resolver = stub_resolver(&stub);
        let candidates = [IpAddr::V4(TEST_ROOT)];

        let (_, first) =
            resolve_from(&resolver, "www.example.com.", RecordType::A, &candidates).await;
        let (ctx, second) =
            resolve_from(&resolver, "www.example.com.", RecordType::A, &candidates).await;

        assert_eq!(first, second);
        assert_eq!(1, stub.call_count());
        assert_eq!(1, ctx.done().cache_hits);
    }

    #[tokio::test]
    async fn falls_back_to_next_server_after_timeout() {
        let stub = Arc::new(
            StubTransport::new()
                .timeout(X, "www.example.com.", RecordType::A)
                .answer(Y, "www.example.com.", RecordType::A, vec![www_a()]),
        );
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(X), IpAddr::V4(Y)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert_eq!(
            vec![
                (X, domain("www.example.com."), RecordType::A),
                (Y, domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        let metrics = ctx.done();
        assert_eq!(1, metrics.timeouts);
        assert_eq!(1, metrics.nameserver_misses);
        assert_eq!(1, metrics.nameserver_hits);
    }

    #[tokio::test]
    async fn skips_ipv6_and_duplicate_candidates() {
        let stub = Arc::new(StubTransport::new());
        let resolver = stub_resolver(&stub);

        let (_, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(X),
                IpAddr::V4(X),
            ],
        )
        .await;

        assert_eq!(None, response);
        assert_eq!(
            vec![(X, domain("www.example.com."), RecordType::A)],
            stub.calls()
        );
    }

    #[tokio::test]
    async fn follows_referral_with_glue() {
        let glue = Ipv4Addr::new(1, 1, 1, 1);
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    TEST_ROOT,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("com.", "a.gtld.com.")],
                    vec![a_record("a.gtld.com.", glue)],
                )
                .answer(glue, "www.example.com.", RecordType::A, vec![www_a()]),
        );
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert_eq!(
            vec![
                (TEST_ROOT, domain("www.example.com."), RecordType::A),
                (glue, domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        assert_eq!(
            Some(vec![glue]),
            resolver.cache().get_delegation(&domain("com."))
        );
        assert!(ctx.is_idle());
    }

    #[tokio::test]
    async fn resolves_glueless_nameservers_up_to_limit() {
        let mut stub = StubTransport::new().referral(
            TEST_ROOT,
            "www.example.com.",
            RecordType::A,
            vec![
                ns_record("example.com.", "ns1.example.net."),
                ns_record("example.com.", "ns2.example.net."),
                ns_record("example.com.", "ns3.example.net."),
                ns_record("example.com.", "ns4.example.net."),
            ],
            Vec::new(),
        );
        for i in 1..=4 {
            let nameserver = format!("ns{i}.example.net.");
            stub = stub.answer(
                TEST_ROOT,
                &nameserver,
                RecordType::A,
                vec![a_record(&nameserver, Ipv4Addr::new(10, 1, 0, i))],
            );
        }
        let stub = Arc::new(stub.answer(
            Ipv4Addr::new(10, 1, 0, 1),
            "www.example.com.",
            RecordType::A,
            vec![www_a()],
        ));
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert_eq!(
            vec![
                (TEST_ROOT, domain("www.example.com."), RecordType::A),
                (TEST_ROOT, domain("ns1.example.net."), RecordType::A),
                (TEST_ROOT, domain("ns2.example.net."), RecordType::A),
                (TEST_ROOT, domain("ns3.example.net."), RecordType::A),
                (Ipv4Addr::new(10, 1, 0, 1), domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        assert_eq!(
            Some(vec![
                Ipv4Addr::new(10, 1, 0, 1),
                Ipv4Addr::new(10, 1, 0, 2),
                Ipv4Addr::new(10, 1, 0, 3),
            ]),
            resolver.cache().get_delegation(&domain("example.com."))
        );
        assert!(ctx.is_idle());
    }

    #[tokio::test]
    async fn glueless_resolution_tolerates_unresolvable_nameserver() {
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    TEST_ROOT,
                    "www.example.com.",
                    RecordType::A,
                    vec![
                        ns_record("example.com.", "ns1.example.net."),
                        ns_record("example.com.", "ns2.example.net."),
                    ],
                    Vec::new(),
                )
                .answer(
                    TEST_ROOT,
                    "ns2.example.net.",
                    RecordType::A,
                    vec![a_record("ns2.example.net.", Y)],
                )
                .answer(Y, "www.example.com.", RecordType::A, vec![www_a()]),
        );
        let resolver = stub_resolver(&stub);

        let (_, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert_eq!(
            Some(vec![Y]),
            resolver.cache().get_delegation(&domain("example.com."))
        );
    }

    #[tokio::test]
    async fn skips_nameserver_already_being_resolved() {
        // ns.example.com is only reachable through example.com
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    TEST_ROOT,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("example.com.", "ns.example.com.")],
                    Vec::new(),
                )
                .referral(
                    TEST_ROOT,
                    "ns.example.com.",
                    RecordType::A,
                    vec![ns_record("example.com.", "ns.example.com.")],
                    Vec::new(),
                ),
        );
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT)],
        )
        .await;

        assert_eq!(None, response);
        assert_eq!(
            vec![
                (TEST_ROOT, domain("www.example.com."), RecordType::A),
                (TEST_ROOT, domain("ns.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        assert!(ctx.is_idle());
        assert_eq!(None, resolver.cache().get_delegation(&domain("example.com.")));
    }

    #[tokio::test]
    async fn nodata_is_terminal() {
        let stub = Arc::new(StubTransport::new().negative(
            TEST_ROOT,
            "www.example.com.",
            RecordType::AAAA,
            Rcode::NoError,
            vec![
                soa_record("example.com."),
                ns_record("example.com.", "ns1.example.com."),
            ],
        ));
        let resolver = stub_resolver(&stub);

        let (_, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::AAAA,
            &[IpAddr::V4(TEST_ROOT), IpAddr::V4(X)],
        )
        .await;

        let response = response.unwrap();
        assert!(response.answers.is_empty());
        assert_eq!(2, response.authority.len());
        assert_eq!(1, stub.call_count());
        assert_eq!(
            Some(response),
            resolver.cache().get_answer(&QueryKey::new(
                domain("www.example.com."),
                RecordType::AAAA
            ))
        );
    }

    #[tokio::test]
    async fn nxdomain_is_terminal() {
        let stub = Arc::new(StubTransport::new().negative(
            TEST_ROOT,
            "nope.example.com.",
            RecordType::A,
            Rcode::NameError,
            vec![soa_record("example.com.")],
        ));
        let resolver = stub_resolver(&stub);

        let (_, response) = resolve_from(
            &resolver,
            "nope.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT), IpAddr::V4(X)],
        )
        .await;

        assert_eq!(Some(Rcode::NameError), response.map(|r| r.header.rcode));
        assert_eq!(1, stub.call_count());
    }

    #[tokio::test]
    async fn dead_end_is_terminal() {
        let stub = Arc::new(StubTransport::new().answer(
            TEST_ROOT,
            "www.example.com.",
            RecordType::A,
            Vec::new(),
        ));
        let resolver = stub_resolver(&stub);

        let (_, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT), IpAddr::V4(X)],
        )
        .await;

        assert!(response.is_some());
        assert_eq!(1, stub.call_count());
    }

    #[tokio::test]
    async fn referral_to_same_zone_is_ignored() {
        // the root refers to itself as a com. nameserver
        let stub = Arc::new(StubTransport::new().referral(
            TEST_ROOT,
            "www.example.com.",
            RecordType::A,
            vec![ns_record("com.", "a.gtld.com.")],
            vec![a_record("a.gtld.com.", TEST_ROOT)],
        ));
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(TEST_ROOT)],
        )
        .await;

        assert_eq!(None, response);
        assert_eq!(2, stub.call_count());
        assert!(ctx.is_idle());
    }

    #[tokio::test]
    async fn mutual_referrals_are_followed_once_per_level() {
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    X,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("com.", "y.gtld.com.")],
                    vec![a_record("y.gtld.com.", Y)],
                )
                .referral(
                    Y,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("example.com.", "x.example.com.")],
                    vec![a_record("x.example.com.", X)],
                ),
        );
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(X), IpAddr::V4(Y)],
        )
        .await;

        assert_eq!(None, response);
        assert_eq!(
            vec![
                (X, domain("www.example.com."), RecordType::A),
                (Y, domain("www.example.com."), RecordType::A),
                (X, domain("www.example.com."), RecordType::A),
                (Y, domain("www.example.com."), RecordType::A),
                (X, domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        assert!(ctx.is_idle());
    }

    #[tokio::test]
    async fn referral_to_unrelated_zone_is_ignored() {
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    X,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("example.net.", "ns.example.net.")],
                    vec![a_record("ns.example.net.", Ipv4Addr::new(6, 6, 6, 6))],
                )
                .answer(Y, "www.example.com.", RecordType::A, vec![www_a()]),
        );
        let resolver = stub_resolver(&stub);

        let (_, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(X), IpAddr::V4(Y)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert_eq!(
            vec![
                (X, domain("www.example.com."), RecordType::A),
                (Y, domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        assert_eq!(None, resolver.cache().get_delegation(&domain("example.net.")));
    }

    #[tokio::test]
    async fn failed_referral_falls_through_to_next_candidate() {
        let z = Ipv4Addr::new(10, 0, 0, 4);
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    X,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("com.", "z.gtld.com.")],
                    vec![a_record("z.gtld.com.", z)],
                )
                .timeout(z, "www.example.com.", RecordType::A)
                .answer(Y, "www.example.com.", RecordType::A, vec![www_a()]),
        );
        let resolver = stub_resolver(&stub);

        let (ctx, response) = resolve_from(
            &resolver,
            "www.example.com.",
            RecordType::A,
            &[IpAddr::V4(X), IpAddr::V4(Y)],
        )
        .await;

        assert_eq!(Some(vec![www_a()]), response.map(|r| r.answers));
        assert_eq!(
            vec![
                (X, domain("www.example.com."), RecordType::A),
                (z, domain("www.example.com."), RecordType::A),
                (Y, domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
        assert_eq!(1, ctx.done().timeouts);
    }

    #[tokio::test]
    async fn stops_at_recursion_limit() {
        let stub = Arc::new(
            StubTransport::new()
                .referral(
                    TEST_ROOT,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("com.", "x.gtld.com.")],
                    vec![a_record("x.gtld.com.", X)],
                )
                .referral(
                    X,
                    "www.example.com.",
                    RecordType::A,
                    vec![ns_record("example.com.", "y.example.com.")],
                    vec![a_record("y.example.com.", Y)],
                )
                .answer(Y, "www.example.com.", RecordType::A, vec![www_a()]),
        );
        let resolver = stub_resolver(&stub);

        let mut ctx = Context::new();
        let response = resolver
            .resolve(
                &mut ctx,
                2,
                &domain("www.example.com."),
                RecordType::A,
                &DomainName::root_domain(),
                &[IpAddr::V4(TEST_ROOT)],
            )
            .await;

        assert_eq!(None, response);
        assert_eq!(
            vec![
                (TEST_ROOT, domain("www.example.com."), RecordType::A),
                (X, domain("www.example.com."), RecordType::A),
            ],
            stub.calls()
        );
    }
}
