use vdp_recon_rs::transform::{
    cluster_hosts, extract_live_urls, extract_params, extract_tech_fingerprints, normalize_hosts,
};
use vdp_recon_rs::types::{ClusterLabel, HostSet};

#[test]
fn normalize_and_cluster_example() {
    let lines = ["API.Example.com", "# comment", "", "dev.example.com", "api.example.com"].join("\n");
    let hosts = normalize_hosts(&[lines]);
    assert_eq!(hosts.as_slice(), ["api.example.com", "dev.example.com"]);

    let clusters = cluster_hosts(&hosts);
    assert_eq!(clusters.get(ClusterLabel::Api), ["api.example.com"]);
    assert_eq!(clusters.get(ClusterLabel::Dev), ["dev.example.com"]);
    assert!(clusters.get(ClusterLabel::Auth).is_empty());
    assert!(clusters.get(ClusterLabel::Prod).is_empty());
    assert!(clusters.get(ClusterLabel::Misc).is_empty());
}

#[test]
fn normalized_hosts_are_clean_unique_and_sorted() {
    let inputs = [
        "  b.example.com\n#skip\n\nA.example.com\n\t\nb.example.com\r\n",
        "c.example.com\n# another\na.example.com\nWWW.example.com",
    ];
    let hosts = normalize_hosts(&inputs);
    let v = hosts.as_slice();
    assert!(v.iter().all(|h| !h.trim().is_empty() && !h.starts_with('#')));
    assert!(v.windows(2).all(|w| w[0] < w[1]), "sorted and unique: {v:?}");
    assert_eq!(v, ["a.example.com", "b.example.com", "c.example.com", "www.example.com"]);
}

#[test]
fn clustering_is_a_total_disjoint_partition() {
    let hosts = normalize_hosts(&[
        "api.example.com\ngraphql.example.com\nrest.example.com\ndev.example.com\ntest.example.com\n\
         staging.example.com\nqa.example.com\nauth.example.com\nlogin.example.com\nsso.example.com\n\
         id.example.com\nwww.example.com\nmail.example.com\nvpn.example.com\napi.staging.example.com",
    ]);
    let clusters = cluster_hosts(&hosts);
    assert_eq!(clusters.total(), hosts.len());

    let mut members: Vec<&str> = clusters
        .iter()
        .flat_map(|(_, hs)| hs.iter().map(String::as_str))
        .collect();
    members.sort();
    let before = members.len();
    members.dedup();
    assert_eq!(before, members.len(), "no host in two clusters");
    assert_eq!(HostSet::from_unsorted(members), hosts);

    assert_eq!(clusters.get(ClusterLabel::Api).len(), 4);
    assert_eq!(clusters.get(ClusterLabel::Dev).len(), 4);
    assert_eq!(clusters.get(ClusterLabel::Auth).len(), 4);
    assert_eq!(clusters.get(ClusterLabel::Prod), ["www.example.com"]);
    assert_eq!(clusters.get(ClusterLabel::Misc), ["mail.example.com", "vpn.example.com"]);
}

#[test]
fn clustering_is_deterministic() {
    let raw = ["x.example.com\nAPI.example.com\nwww.example.com", "dev.example.com\nx.example.com"];
    let a = cluster_hosts(&normalize_hosts(&raw));
    let b = cluster_hosts(&normalize_hosts(&raw));
    assert_eq!(a, b);
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[test]
fn empty_input_yields_empty_clusters() {
    let hosts = normalize_hosts::<&str>(&[]);
    assert!(hosts.is_empty());
    let clusters = cluster_hosts(&hosts);
    assert_eq!(clusters.total(), 0);
    let json = serde_json::to_value(&clusters).unwrap();
    for label in ["api", "dev", "auth", "prod", "misc"] {
        assert_eq!(json[label], serde_json::json!([]));
    }
}

#[test]
fn live_probe_example() {
    let line = "https://api.example.com [200] [nginx,react]";
    assert_eq!(extract_live_urls(line), ["https://api.example.com"]);
    let tech = extract_tech_fingerprints(line);
    let json = serde_json::to_value(&tech).unwrap();
    assert_eq!(json, serde_json::json!({"https://api.example.com": ["nginx", "react"]}));
}

#[test]
fn transforms_tolerate_garbage() {
    let junk = "\u{0}\u{1}[[[]]]\n:::\n[unterminated\nhttp://\n   \n";
    let _ = extract_live_urls(junk);
    assert!(extract_tech_fingerprints(junk).is_empty());
    assert!(extract_params(junk).is_empty());
}

#[test]
fn crawler_params_map_to_paths() {
    let out = "https://shop.example.com/cart?item=4&qty=1\n\
               https://shop.example.com/cart?item=9\n\
               https://shop.example.com/?ref=home\n\
               relative/path?x=1\n";
    let params = extract_params(out);
    let keys: Vec<_> = params.keys().cloned().collect();
    assert_eq!(keys, ["item", "qty", "ref"]);
    assert_eq!(params["item"].len(), 1);
    assert!(params["ref"].contains("/"));
}
