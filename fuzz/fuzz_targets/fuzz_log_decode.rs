#![no_main]

use certchain_chain::ContractAbi;
use certchain_types::{Digest, EventKind};
use libfuzzer_sys::fuzz_target;

// The first byte picks how many 32-byte topics to peel off the front; the
// rest is log data. Topic 0 is forced to the event's own signature so the
// decoder gets past the name check and into the payload.
fuzz_target!(|data: &[u8]| {
    let Ok(contract) = ContractAbi::bundled() else {
        return;
    };
    let Some((&count, rest)) = data.split_first() else {
        return;
    };
    let count = usize::from(count % 4);
    if rest.len() < count * 32 {
        return;
    }
    let (topic_bytes, log_data) = rest.split_at(count * 32);

    for kind in EventKind::ALL {
        let Ok(event) = contract.event(kind.as_str()) else {
            continue;
        };
        let mut topics = vec![event.topic()];
        for chunk in topic_bytes.chunks_exact(32) {
            if let Ok(topic) = Digest::from_slice(chunk) {
                topics.push(topic);
            }
        }
        let _ = event.decode_log(&topics, log_data);
        if topics.get(1) != Some(&event.topic()) {
            assert!(event.decode_log(&topics[1..], log_data).is_err());
        }
    }
});
