use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;
use std::net::{Ipv4Addr, Ipv6Addr};

use dns_types::protocol::types::*;

fn query(name: &str, rtype: RecordType) -> Message {
    Message::from_question(1234, Question::new(domain(name), rtype))
}

fn bench_codec(c: &mut Criterion, id: &str, message: &Message) {
    c.bench_function(&format!("serialise/{id}"), |b| {
        b.iter_batched(
            || message.clone(),
            |message| message.to_octets(),
            BatchSize::SmallInput,
        );
    });

    let serialised = message.to_octets().unwrap();
    c.bench_function(&format!("deserialise/{id}"), |b| {
        b.iter(|| Message::from_octets(black_box(&serialised)));
    });
}

fn bench_query(c: &mut Criterion) {
    bench_codec(c, "query", &query("www.example.com.", RecordType::A));
}

fn bench_cname_chain(c: &mut Criterion) {
    let mut message = query("www.example.com.", RecordType::A).make_response();
    message.answers = vec![
        record(
            "www.example.com.",
            RecordTypeWithData::CNAME {
                cname: domain("edge.example.net."),
            },
        ),
        record(
            "edge.example.net.",
            RecordTypeWithData::A {
                address: Ipv4Addr::new(93, 184, 216, 34),
            },
        ),
    ];

    bench_codec(c, "cname_chain", &message);
}

// a root referral to a TLD: 13 NS names with A and AAAA glue each
fn bench_referral(c: &mut Criterion) {
    let mut message = query("www.example.com.", RecordType::A).make_response();

    for letter in 'a'..='m' {
        let nsdname = format!("{letter}.gtld-servers.net.");
        let octet = letter as u8;
        message.authority.push(record(
            "com.",
            RecordTypeWithData::NS {
                nsdname: domain(&nsdname),
            },
        ));
        message.additional.push(record(
            &nsdname,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(192, 5, 6, octet),
            },
        ));
        message.additional.push(record(
            &nsdname,
            RecordTypeWithData::AAAA {
                address: Ipv6Addr::new(0x2001, 0x503, 0xa83e, 0, 0, 0, 2, u16::from(octet)),
            },
        ));
    }

    bench_codec(c, "referral", &message);
}

fn domain(name: &str) -> DomainName {
    DomainName::from_dotted_string(name).unwrap()
}

fn record(name: &str, rtype_with_data: RecordTypeWithData) -> ResourceRecord {
    ResourceRecord {
        name: domain(name),
        rtype_with_data,
        rclass: RecordClass::IN,
        ttl: 300,
    }
}

criterion_group!(benches, bench_query, bench_cname_chain, bench_referral);
criterion_main!(benches);
