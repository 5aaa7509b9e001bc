use kchan_controller::crd::KafkaChannel;
use kube::core::CustomResourceExt;

fn main() {
    let crd = KafkaChannel::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
