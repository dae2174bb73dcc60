//! Fuzz target for responder-ordered suite selection

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use peerlink_core::suite::select;

#[derive(Debug, Arbitrary)]
struct Offer {
    own: Vec<u8>,
    offered: Vec<u8>,
}

fuzz_target!(|offer: Offer| {
    match select(&offer.own, &offer.offered) {
        Some(choice) => {
            assert!(offer.offered.contains(&choice));
            let first = offer
                .own
                .iter()
                .find(|x| offer.offered.contains(x))
                .copied();
            assert_eq!(first, Some(choice));
        }
        None => assert!(offer.own.iter().all(|x| !offer.offered.contains(x))),
    }
});
