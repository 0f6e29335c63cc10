use std::net::IpAddr;
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::cache::QueryKey;
use crate::context::Context;
use crate::metrics::Metrics;
use crate::Resolver;

impl Resolver {
    /// Resolve a question, following CNAMEs.
    ///
    /// This always gives back a response.  If resolution fails
    /// entirely it is an empty one: the caller decides what to make of
    /// that.
    pub async fn lookup(&self, name: &DomainName, rtype: RecordType) -> Message {
        self.lookup_with_metrics(name, rtype).await.1
    }

    /// Like `lookup`, but also return the metrics for this lookup.
    pub async fn lookup_with_metrics(
        &self,
        name: &DomainName,
        rtype: RecordType,
    ) -> (Metrics, Message) {
        let mut ctx = Context::new();
        let response = self.lookup_in_context(&mut ctx, name, rtype).await;
        (ctx.done(), response)
    }

    pub(crate) async fn lookup_in_context(
        &self,
        ctx: &mut Context,
        name: &DomainName,
        rtype: RecordType,
    ) -> Message {
        self.chase_cnames(ctx, name, rtype)
            .instrument(tracing::error_span!("lookup", %name, %rtype))
            .await
    }

    async fn chase_cnames(
        &self,
        ctx: &mut Context,
        name: &DomainName,
        rtype: RecordType,
    ) -> Message {
        let key = QueryKey::new(name.clone(), rtype);
        if let Some(response) = self.cache.get_answer(&key) {
            tracing::trace!("cache hit");
            ctx.metrics().cache_hit();
            return response;
        }

        let mut answers = Vec::new();
        let mut current_name = name.clone();
        let mut cnames_followed = 0;

        let response = loop {
            if cnames_followed == self.config.cname_limit {
                tracing::debug!(%current_name, "hit CNAME limit");
                break synthesise(name, rtype, answers);
            }

            let (zone, candidates) = self.start_candidates(&current_name);
            let response = self
                .resolve(
                    ctx,
                    self.config.recursion_limit,
                    &current_name,
                    rtype,
                    &zone,
                    &candidates,
                )
                .await;

            let response = match response {
                Some(response) if !response.answers.is_empty() => response,
                response if !answers.is_empty() => {
                    tracing::trace!(%current_name, ?response, "CNAME target did not resolve");
                    break synthesise(name, rtype, answers);
                }
                Some(response) => break response,
                None => {
                    tracing::debug!("could not resolve");
                    break synthesise(name, rtype, Vec::new());
                }
            };

            let found = response
                .answers
                .iter()
                .any(|rr| rr.rtype() == rtype);
            let cname_target = response.answers.iter().find_map(|rr| match &rr.rtype_with_data {
                RecordTypeWithData::CNAME { cname } => Some(cname.clone()),
                _ => None,
            });

            answers.extend(response.answers);

            match cname_target {
                Some(target) if !found => {
                    tracing::trace!(%current_name, %target, "following CNAME");
                    current_name = target;
                    cnames_followed += 1;
                }
                _ => break synthesise(name, rtype, answers),
            }
        };

        self.cache.insert_answer(key, response.clone());
        response
    }

    /// Where to start resolving a name: the closest enclosing zone
    /// with cached nameservers, or the root hints.
    fn start_candidates(&self, name: &DomainName) -> (DomainName, Vec<IpAddr>) {
        if let Some((zone, addresses)) = self.cache.closest_delegation(name) {
            tracing::trace!(%zone, "starting from cached delegation");
            (zone, addresses.into_iter().map(IpAddr::V4).collect())
        } else {
            tracing::trace!("starting from root hints");
            (DomainName::root_domain(), self.config.root_hints.clone())
        }
    }
}

/// A response to the original question, holding every answer record
/// found along the way.
fn synthesise(name: &DomainName, rtype: RecordType, answers: Vec<ResourceRecord>) -> Message {
    let mut response =
        Message::from_question(rand::random(), Question::new(name.clone(), rtype)).make_response();
    response.answers = answers;
    response
}
